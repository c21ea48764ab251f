use super::{ReportDataset, SectionReport};
use crate::error::{M365Error, Result};

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| M365Error::IoError(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| M365Error::ConfigError(format!("CSV output is not UTF-8: {}", e)))
}

/// One CSV per section, headers first
pub fn render_section_csv(section: &SectionReport) -> Result<String> {
    let (headers, rows) = section.data.table();
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(&headers)?;
    for row in &rows {
        writer.write_record(row)?;
    }

    finish(writer)
}

/// Field,Value summary of the run and each section's highlights
pub fn render_summary_csv(dataset: &ReportDataset) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["Section", "Field", "Value"])?;

    writer.write_record(["Report", "Tenant", dataset.tenant.as_str()])?;
    writer.write_record(["Report", "Cadence", dataset.cadence.as_str()])?;
    writer.write_record([
        "Report".to_string(),
        "Generated".to_string(),
        dataset.generated_at.to_rfc3339(),
    ])?;
    writer.write_record([
        "Report".to_string(),
        "Period Start".to_string(),
        dataset.period_start.to_rfc3339(),
    ])?;

    for section in &dataset.sections {
        let title = section.section.title();
        let origin = match &section.origin {
            super::DataOrigin::Live => "live".to_string(),
            super::DataOrigin::Sample(reason) => format!("sample ({})", reason),
        };
        writer.write_record([title, "Data Source", origin.as_str()])?;

        for (field, value) in section.data.highlights(dataset.generated_at) {
            writer.write_record([title, field.as_str(), value.as_str()])?;
        }
    }

    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        Cadence, DataOrigin, LicenseRecord, ReportSection, SectionRows, UserRecord,
    };
    use chrono::{TimeZone, Utc};

    fn dataset() -> ReportDataset {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap();
        ReportDataset {
            tenant: "CONTOSO".into(),
            tenant_id: "tid".into(),
            cadence: Cadence::Monthly,
            generated_at: now,
            period_start: now - Cadence::Monthly.lookback(),
            sections: vec![
                SectionReport {
                    section: ReportSection::Licenses,
                    origin: DataOrigin::Live,
                    data: SectionRows::Licenses(vec![LicenseRecord {
                        sku_part_number: "SPE_E3".into(),
                        sku_id: "05e9a617".into(),
                        enabled_units: 10,
                        consumed_units: 8,
                    }]),
                },
                SectionReport {
                    section: ReportSection::Users,
                    origin: DataOrigin::Sample("HTTP 403".into()),
                    data: SectionRows::Users(vec![UserRecord {
                        display_name: "Vance, Adele \"AV\"".into(),
                        user_principal_name: "adelev@contoso.com".into(),
                        department: Some("Retail".into()),
                        account_enabled: true,
                        created: None,
                        last_sign_in: None,
                        license_count: 1,
                    }]),
                },
            ],
        }
    }

    #[test]
    fn test_section_csv_quotes_fields() {
        let data = dataset();
        let csv = render_section_csv(&data.sections[1]).unwrap();
        let mut lines = csv.lines();

        assert_eq!(
            lines.next().unwrap(),
            "Display Name,User Principal Name,Department,Enabled,Created,Last Sign-In,Licenses"
        );
        assert_eq!(
            lines.next().unwrap(),
            r#""Vance, Adele ""AV""",adelev@contoso.com,Retail,Yes,,,1"#
        );
    }

    #[test]
    fn test_summary_csv_marks_sample_sections() {
        let csv = render_summary_csv(&dataset()).unwrap();

        assert!(csv.starts_with("Section,Field,Value\n"));
        assert!(csv.contains("Report,Cadence,monthly"));
        assert!(csv.contains("Licenses,Data Source,live"));
        assert!(csv.contains("Users,Data Source,sample (HTTP 403)"));
        assert!(csv.contains("Licenses,Utilization,80.0%"));
    }
}
