use crate::funnel::Window;
use crate::schema::DataSource;

/// Fully qualified BigQuery table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn full_id(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub table: TableRef,
    pub data_source: DataSource,
    pub default_window: Window,
    pub query_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            table: TableRef::new(
                std::env::var("FUNNELYTICS_PROJECT")
                    .map_err(|_| "FUNNELYTICS_PROJECT is required".to_string())?,
                std::env::var("FUNNELYTICS_DATASET")
                    .map_err(|_| "FUNNELYTICS_DATASET is required".to_string())?,
                std::env::var("FUNNELYTICS_TABLE")
                    .map_err(|_| "FUNNELYTICS_TABLE is required".to_string())?,
            ),
            data_source: DataSource::parse(
                &std::env::var("FUNNELYTICS_DATA_SOURCE").unwrap_or_else(|_| "standard".to_string()),
            )
            .map_err(|e| e.to_string())?,
            default_window: Window::parse(
                &std::env::var("FUNNELYTICS_WINDOW").unwrap_or_else(|_| "24h".to_string()),
            )
            .map_err(|e| e.to_string())?,
            query_timeout_ms: std::env::var("FUNNELYTICS_QUERY_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_table_id() {
        let table = TableRef::new("my-project", "analytics", "events");
        assert_eq!(table.full_id(), "my-project.analytics.events");
    }
}
