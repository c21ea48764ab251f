use super::sample::SampleData;
use super::{Cadence, DataOrigin, ReportDataset, ReportSection, SectionReport, SectionRows};
use crate::audit;
use crate::error::{M365Error, Result};
use crate::graph::{GraphClient, reports};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where section data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    /// Graph only; any failed section fails the run
    Live,
    /// Generated data only, no Graph calls
    Sample,
    /// Graph, replacing failed sections with generated data
    LiveWithFallback,
}

impl DataMode {
    pub fn from_flags(sample: bool, fallback: bool) -> Self {
        match (sample, fallback) {
            (true, _) => DataMode::Sample,
            (false, true) => DataMode::LiveWithFallback,
            (false, false) => DataMode::Live,
        }
    }
}

pub struct ReportCollector<'a> {
    graph: Option<&'a GraphClient>,
    mode: DataMode,
    tenant: String,
    tenant_id: String,
    seed: Option<u64>,
    now: DateTime<Utc>,
}

impl<'a> ReportCollector<'a> {
    pub fn new(tenant: &str, tenant_id: &str, mode: DataMode) -> Self {
        Self {
            graph: None,
            mode,
            tenant: tenant.to_string(),
            tenant_id: tenant_id.to_string(),
            seed: None,
            now: Utc::now(),
        }
    }

    pub fn with_graph(mut self, graph: &'a GraphClient) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Fix the reference time (report period end)
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    /// Collect every section the cadence calls for
    pub async fn collect(&self, cadence: Cadence) -> Result<ReportDataset> {
        let period_start = self.now - cadence.lookback();
        let mut sample = SampleData::new(&self.tenant, self.seed, self.now);
        let mut sections = Vec::with_capacity(cadence.sections().len());

        for &section in cadence.sections() {
            let report = match self.mode {
                DataMode::Sample => SectionReport {
                    section,
                    origin: DataOrigin::Sample("sample data requested".into()),
                    data: sample.section(section, cadence),
                },
                DataMode::Live | DataMode::LiveWithFallback => {
                    match self.fetch_live(section, cadence, period_start).await {
                        Ok(data) => {
                            info!(
                                section = section.title(),
                                rows = data.len(),
                                "Collected live data"
                            );
                            SectionReport {
                                section,
                                origin: DataOrigin::Live,
                                data,
                            }
                        }
                        Err(e) if self.mode == DataMode::LiveWithFallback => {
                            let reason = e.to_string();
                            warn!(
                                section = section.title(),
                                tenant = %self.tenant,
                                "Live data unavailable, using sample data: {}",
                                reason
                            );
                            audit::record_sample_data_used(section.title(), &reason, &self.tenant);
                            SectionReport {
                                section,
                                origin: DataOrigin::Sample(reason),
                                data: sample.section(section, cadence),
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            };
            sections.push(report);
        }

        Ok(ReportDataset {
            tenant: self.tenant.clone(),
            tenant_id: self.tenant_id.clone(),
            cadence,
            generated_at: self.now,
            period_start,
            sections,
        })
    }

    async fn fetch_live(
        &self,
        section: ReportSection,
        cadence: Cadence,
        since: DateTime<Utc>,
    ) -> Result<SectionRows> {
        let graph = self
            .graph
            .ok_or_else(|| M365Error::ConfigError("Not connected to Microsoft Graph".into()))?;

        Ok(match section {
            ReportSection::Users => SectionRows::Users(reports::users(graph).await?),
            ReportSection::Licenses => SectionRows::Licenses(reports::licenses(graph).await?),
            ReportSection::Mailboxes => {
                SectionRows::Mailboxes(reports::mailbox_usage(graph, cadence.usage_period()).await?)
            }
            ReportSection::SignIns => SectionRows::SignIns(
                reports::sign_ins(graph, since, cadence.sign_in_page_limit()).await?,
            ),
            ReportSection::MfaStatus => {
                SectionRows::MfaStatus(reports::mfa_registration(graph).await?)
            }
            ReportSection::SecurityAlerts => {
                SectionRows::SecurityAlerts(reports::security_alerts(graph, since).await?)
            }
        })
    }
}
