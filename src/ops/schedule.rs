//! OS task-scheduler registration for report runs
//!
//! Unix gets one tagged crontab line per tenant and cadence; Windows gets a
//! named Task Scheduler task. Both are idempotent: installing again replaces
//! the previous entry.

use super::run_command;
use crate::error::{M365Error, Result};
use crate::report::Cadence;
use std::path::PathBuf;
use tracing::info;

const TAG_PREFIX: &str = "# m365ops:";

/// One scheduled report run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub cadence: Cadence,
    pub tenant: String,
    pub hour: u8,
    pub minute: u8,
    /// The m365ops executable the scheduler will invoke
    pub executable: PathBuf,
}

/// Parse `HH:MM` (24h)
pub fn parse_time(value: &str) -> Result<(u8, u8)> {
    let invalid = || M365Error::InvalidConfig(format!("Invalid time '{}', expected HH:MM", value));
    let (h, m) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u8 = h.parse().map_err(|_| invalid())?;
    let minute: u8 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

pub fn cron_expression(cadence: Cadence, hour: u8, minute: u8) -> String {
    match cadence {
        Cadence::Daily => format!("{} {} * * *", minute, hour),
        Cadence::Weekly => format!("{} {} * * 1", minute, hour),
        Cadence::Monthly => format!("{} {} 1 * *", minute, hour),
        Cadence::Yearly => format!("{} {} 1 1 *", minute, hour),
    }
}

/// Marker identifying our crontab line for a tenant and cadence
pub fn tag(tenant: &str, cadence: Cadence) -> String {
    format!("{}{}:{}", TAG_PREFIX, tenant, cadence.as_str())
}

/// cron turns an unescaped `%` in the command field into a newline
fn cron_escape(value: &str) -> String {
    value.replace('%', r"\%")
}

/// Task Scheduler name for a tenant and cadence
pub fn task_name(tenant: &str, cadence: Cadence) -> String {
    format!(
        "m365ops-{}-{}",
        crate::report::sanitize_filename(tenant).replace(' ', "_"),
        cadence.as_str()
    )
}

fn shell_quote(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@".contains(c))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

impl ScheduleSpec {
    pub fn report_args(&self) -> Vec<String> {
        vec![
            "report".into(),
            "run".into(),
            "--cadence".into(),
            self.cadence.as_str().into(),
            "--tenant".into(),
            self.tenant.clone(),
        ]
    }

    pub fn crontab_line(&self) -> String {
        let command: Vec<String> = std::iter::once(self.executable.to_string_lossy().to_string())
            .chain(self.report_args())
            .map(|arg| cron_escape(&shell_quote(&arg)))
            .collect();
        format!(
            "{} {} {}",
            cron_expression(self.cadence, self.hour, self.minute),
            command.join(" "),
            cron_escape(&tag(&self.tenant, self.cadence))
        )
    }

    /// Arguments for `schtasks`
    pub fn schtasks_create_args(&self) -> Vec<String> {
        let task_run = format!(
            "\"{}\" {}",
            self.executable.display(),
            self.report_args()
                .iter()
                .map(|a| if a.contains(' ') { format!("\"{}\"", a) } else { a.clone() })
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut args: Vec<String> = vec![
            "/Create".into(),
            "/F".into(),
            "/TN".into(),
            task_name(&self.tenant, self.cadence),
            "/TR".into(),
            task_run,
        ];
        let schedule: &[&str] = match self.cadence {
            Cadence::Daily => &["/SC", "DAILY"],
            Cadence::Weekly => &["/SC", "WEEKLY", "/D", "MON"],
            Cadence::Monthly => &["/SC", "MONTHLY", "/D", "1"],
            Cadence::Yearly => &["/SC", "MONTHLY", "/MO", "12", "/D", "1"],
        };
        args.extend(schedule.iter().map(|s| s.to_string()));
        args.push("/ST".into());
        args.push(format!("{:02}:{:02}", self.hour, self.minute));
        args
    }
}

fn is_tagged(line: &str, tag: &str) -> bool {
    line.trim_end().ends_with(tag)
}

/// Replace any line carrying this schedule's tag with the new line
pub fn merge_crontab(existing: &str, spec: &ScheduleSpec) -> String {
    let tag = cron_escape(&tag(&spec.tenant, spec.cadence));
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !is_tagged(line, &tag))
        .map(str::to_string)
        .collect();
    lines.push(spec.crontab_line());
    lines.join("\n") + "\n"
}

/// Crontab without the tagged line; `None` if nothing was removed
pub fn remove_from_crontab(existing: &str, tenant: &str, cadence: Cadence) -> Option<String> {
    let tag = cron_escape(&tag(tenant, cadence));
    let kept: Vec<&str> = existing.lines().filter(|line| !is_tagged(line, &tag)).collect();
    if kept.len() == existing.lines().count() {
        return None;
    }
    if kept.is_empty() {
        Some(String::new())
    } else {
        Some(kept.join("\n") + "\n")
    }
}

async fn read_crontab() -> Result<String> {
    match run_command("crontab", &["-l"], None, None).await {
        Ok(output) => Ok(output.stdout),
        // "no crontab for <user>"
        Err(M365Error::CommandFailed { stderr, .. }) if stderr.contains("no crontab") => {
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

async fn write_crontab(contents: &str) -> Result<()> {
    run_command("crontab", &["-"], None, Some(contents.as_bytes())).await?;
    Ok(())
}

/// Register the scheduled run. Returns the installed entry text.
pub async fn install(spec: &ScheduleSpec, dry_run: bool) -> Result<String> {
    if cfg!(windows) {
        let args = spec.schtasks_create_args();
        let text = format!("schtasks {}", args.join(" "));
        if !dry_run {
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            run_command("schtasks", &refs, None, None).await?;
            info!(task = %task_name(&spec.tenant, spec.cadence), "Scheduled task created");
        }
        return Ok(text);
    }

    let line = spec.crontab_line();
    if !dry_run {
        let existing = read_crontab().await?;
        write_crontab(&merge_crontab(&existing, spec)).await?;
        info!(cadence = spec.cadence.as_str(), tenant = %spec.tenant, "Crontab entry installed");
    }
    Ok(line)
}

/// Unregister the scheduled run. Returns false when nothing was registered.
pub async fn remove(tenant: &str, cadence: Cadence, dry_run: bool) -> Result<bool> {
    if cfg!(windows) {
        if dry_run {
            return Ok(true);
        }
        let name = task_name(tenant, cadence);
        return match run_command("schtasks", &["/Delete", "/F", "/TN", &name], None, None).await {
            Ok(_) => Ok(true),
            Err(M365Error::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        };
    }

    let existing = read_crontab().await?;
    match remove_from_crontab(&existing, tenant, cadence) {
        Some(updated) => {
            if !dry_run {
                write_crontab(&updated).await?;
            }
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn spec(cadence: Cadence) -> ScheduleSpec {
        ScheduleSpec {
            cadence,
            tenant: "CONTOSO".into(),
            hour: 6,
            minute: 30,
            executable: PathBuf::from("/usr/local/bin/m365ops"),
        }
    }

    #[test]
    fn test_cron_expressions() {
        assert_eq!(cron_expression(Cadence::Daily, 6, 30), "30 6 * * *");
        assert_eq!(cron_expression(Cadence::Weekly, 6, 30), "30 6 * * 1");
        assert_eq!(cron_expression(Cadence::Monthly, 6, 30), "30 6 1 * *");
        assert_eq!(cron_expression(Cadence::Yearly, 0, 5), "5 0 1 1 *");
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("06:30").unwrap(), (6, 30));
        assert_eq!(parse_time("23:59").unwrap(), (23, 59));
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("6").is_err());
        assert!(parse_time("ab:cd").is_err());
    }

    #[test]
    fn test_crontab_line() {
        assert_eq!(
            spec(Cadence::Daily).crontab_line(),
            "30 6 * * * /usr/local/bin/m365ops report run --cadence daily --tenant CONTOSO # m365ops:CONTOSO:daily"
        );

        let mut spaced = spec(Cadence::Weekly);
        spaced.executable = PathBuf::from("/opt/my tools/m365ops");
        assert!(spaced.crontab_line().contains("'/opt/my tools/m365ops' report run"));
    }

    #[test]
    fn test_percent_in_tenant_is_escaped_for_cron() {
        let mut percent = spec(Cadence::Daily);
        percent.tenant = "50%Off".into();
        let line = percent.crontab_line();
        assert_eq!(
            line,
            r"30 6 * * * /usr/local/bin/m365ops report run --cadence daily --tenant '50\%Off' # m365ops:50\%Off:daily"
        );
        assert!(!line.replace(r"\%", "").contains('%'));

        let installed = merge_crontab("", &percent);
        assert_eq!(merge_crontab(&installed, &percent), installed);
        assert_eq!(remove_from_crontab(&installed, "50%Off", Cadence::Daily), Some(String::new()));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = "MAILTO=ops@contoso.com\n0 1 * * * /usr/bin/backup\n";
        let once = merge_crontab(existing, &spec(Cadence::Daily));
        let twice = merge_crontab(&once, &spec(Cadence::Daily));
        assert_eq!(once, twice);
        assert_eq!(twice.lines().count(), 3);

        // Another cadence for the same tenant is a separate entry
        let both = merge_crontab(&twice, &spec(Cadence::Monthly));
        assert_eq!(both.lines().count(), 4);
    }

    #[test]
    fn test_remove_tagged_line() {
        let installed = merge_crontab("0 1 * * * /usr/bin/backup\n", &spec(Cadence::Daily));
        let removed = remove_from_crontab(&installed, "CONTOSO", Cadence::Daily).unwrap();
        assert_eq!(removed, "0 1 * * * /usr/bin/backup\n");

        assert_eq!(remove_from_crontab(&removed, "CONTOSO", Cadence::Daily), None);
        assert_eq!(
            remove_from_crontab(&spec(Cadence::Daily).crontab_line(), "CONTOSO", Cadence::Daily),
            Some(String::new())
        );
    }

    #[test]
    fn test_schtasks_yearly_runs_every_twelve_months() {
        let args = spec(Cadence::Yearly).schtasks_create_args();
        let joined = args.join(" ");
        assert!(joined.contains("/TN m365ops-CONTOSO-yearly"));
        assert!(joined.contains("/SC MONTHLY /MO 12 /D 1"));
        assert!(joined.ends_with("/ST 06:30"));
        assert!(args.contains(
            &"\"/usr/local/bin/m365ops\" report run --cadence yearly --tenant CONTOSO".to_string()
        ));
    }
}
