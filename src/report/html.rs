//! HTML report rendering
//!
//! One self-contained document per run: header, sample-data notice,
//! summary cards, a table per section and a footer. Every value coming
//! from a tenant is escaped before interpolation.

use super::{DataOrigin, ReportDataset, SectionReport};
use html_escape::encode_text;

/// Generate the complete HTML report
pub fn render_html(dataset: &ReportDataset) -> String {
    let title = format!("{} - {}", dataset.cadence.title(), dataset.tenant);
    let header = generate_header(dataset);
    let notice = generate_sample_notice(dataset);
    let summary = generate_summary_section(dataset);
    let sections = dataset
        .sections
        .iter()
        .map(generate_table_section)
        .collect::<Vec<_>>()
        .join("\n");
    let footer = generate_footer(dataset);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
{css}
    </style>
</head>
<body>
    <div class="container">
{header}
{notice}
{summary}
{sections}
{footer}
    </div>
</body>
</html>"#,
        title = encode_text(&title),
        css = CSS,
        header = header,
        notice = notice,
        summary = summary,
        sections = sections,
        footer = footer,
    )
}

const CSS: &str = r#"
        :root {
            --primary: #1e40af;
            --secondary: #64748b;
            --warning: #ca8a04;
            --light: #f8fafc;
            --dark: #1e293b;
            --border: #e2e8f0;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
            line-height: 1.6;
            color: var(--dark);
            background: var(--light);
        }

        .container { max-width: 1200px; margin: 0 auto; padding: 2rem; background: white; }

        .header { text-align: center; padding: 2rem 0; border-bottom: 3px solid var(--primary); margin-bottom: 2rem; }
        .header h1 { color: var(--primary); font-size: 2rem; font-weight: 600; }
        .header .metadata { display: flex; justify-content: center; gap: 2rem; margin-top: 1rem; font-size: 0.9rem; color: var(--secondary); }

        .notice { background: #fef9c3; border-left: 4px solid var(--warning); padding: 1rem; margin-bottom: 2rem; border-radius: 4px; }
        .notice li { margin-left: 1.5rem; }

        .section { margin-bottom: 2rem; }
        .section-title { font-size: 1.25rem; font-weight: 600; color: var(--primary); margin-bottom: 1rem; padding-bottom: 0.5rem; border-bottom: 2px solid var(--border); }
        .badge { font-size: 0.75rem; padding: 0.15rem 0.5rem; border-radius: 9999px; margin-left: 0.5rem; vertical-align: middle; }
        .badge-live { background: #dcfce7; color: #166534; }
        .badge-sample { background: #fef9c3; color: #854d0e; }

        .summary-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 1rem; }
        .summary-card { background: var(--light); border: 1px solid var(--border); border-radius: 8px; padding: 1rem; }
        .summary-card h4 { color: var(--primary); margin-bottom: 0.5rem; }
        .metric { display: flex; justify-content: space-between; font-size: 0.9rem; }
        .metric-value { font-weight: 600; }

        table { width: 100%; border-collapse: collapse; font-size: 0.85rem; }
        th { background: var(--primary); color: white; text-align: left; padding: 0.5rem; }
        td { padding: 0.5rem; border-bottom: 1px solid var(--border); }
        tr:nth-child(even) td { background: var(--light); }
        .empty { color: var(--secondary); font-style: italic; }

        .footer { text-align: center; padding-top: 2rem; border-top: 1px solid var(--border); color: var(--secondary); font-size: 0.85rem; }

        @media print {
            .container { max-width: none; padding: 0; }
            .section { break-inside: avoid; }
        }
"#;

fn generate_header(dataset: &ReportDataset) -> String {
    format!(
        r#"        <header class="header">
            <h1>{title}</h1>
            <div class="metadata">
                <span><strong>Tenant:</strong> {tenant}</span>
                <span><strong>Period:</strong> {start} to {end}</span>
                <span><strong>Generated:</strong> {generated}</span>
            </div>
        </header>"#,
        title = dataset.cadence.title(),
        tenant = encode_text(&dataset.tenant),
        start = dataset.period_start.format("%Y-%m-%d"),
        end = dataset.generated_at.format("%Y-%m-%d"),
        generated = dataset.generated_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

fn generate_sample_notice(dataset: &ReportDataset) -> String {
    let items: Vec<String> = dataset
        .sample_sections()
        .map(|s| {
            let reason = match &s.origin {
                DataOrigin::Sample(reason) => reason.as_str(),
                DataOrigin::Live => "",
            };
            format!(
                "                <li><strong>{}</strong>: {}</li>",
                s.section.title(),
                encode_text(reason)
            )
        })
        .collect();

    if items.is_empty() {
        return String::new();
    }

    format!(
        r#"        <div class="notice">
            <p><strong>Sample data:</strong> live data was unavailable for the sections below. Their figures are generated and must not be used for decisions.</p>
            <ul>
{}
            </ul>
        </div>"#,
        items.join("\n")
    )
}

fn generate_summary_section(dataset: &ReportDataset) -> String {
    if dataset.sections.is_empty() {
        return String::new();
    }

    let cards: String = dataset
        .sections
        .iter()
        .map(|s| {
            let metrics: String = s
                .data
                .highlights(dataset.generated_at)
                .iter()
                .map(|(label, value)| {
                    format!(
                        r#"<div class="metric"><span>{}</span><span class="metric-value">{}</span></div>"#,
                        encode_text(label),
                        encode_text(value)
                    )
                })
                .collect::<Vec<_>>()
                .join("");
            format!(
                r#"            <div class="summary-card">
                <h4>{title}</h4>
                {metrics}
            </div>"#,
                title = s.section.title(),
                metrics = metrics,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"        <section class="section">
            <h2 class="section-title">Summary</h2>
            <div class="summary-grid">
{cards}
            </div>
        </section>"#,
        cards = cards,
    )
}

fn generate_table_section(section: &SectionReport) -> String {
    let (headers, rows) = section.data.table();
    let badge = if section.origin.is_sample() {
        r#"<span class="badge badge-sample">Sample data</span>"#
    } else {
        r#"<span class="badge badge-live">Live</span>"#
    };

    let head: String = headers
        .iter()
        .map(|h| format!("<th>{}</th>", encode_text(h)))
        .collect();

    let body = if rows.is_empty() {
        format!(
            r#"                    <tr><td class="empty" colspan="{}">No records for this period</td></tr>"#,
            headers.len()
        )
    } else {
        rows.iter()
            .map(|row| {
                let cells: String = row
                    .iter()
                    .map(|c| format!("<td>{}</td>", encode_text(c)))
                    .collect();
                format!("                    <tr>{}</tr>", cells)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"        <section class="section" id="{id}">
            <h2 class="section-title">{title} ({count}){badge}</h2>
            <table>
                <thead>
                    <tr>{head}</tr>
                </thead>
                <tbody>
{body}
                </tbody>
            </table>
        </section>"#,
        id = section.section.slug(),
        title = section.section.title(),
        count = rows.len(),
        badge = badge,
        head = head,
        body = body,
    )
}

fn generate_footer(dataset: &ReportDataset) -> String {
    format!(
        r#"        <footer class="footer">
            <p>Report generated by m365ops {version}</p>
            <p>Tenant: {tenant} ({tenant_id})</p>
        </footer>"#,
        version = env!("CARGO_PKG_VERSION"),
        tenant = encode_text(&dataset.tenant),
        tenant_id = encode_text(&dataset.tenant_id),
    )
}
