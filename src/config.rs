//! # Configuration
//!
//! A batch run is described by a TOML file deserialized into
//! [`SurveyConfig`]. Credentials are kept out of it and read separately
//! through [`Credentials`].
//!
//! ```
//! use survey_batch::config::{RoutingConfig, SurveyConfig};
//!
//! let config = SurveyConfig::from_toml_str(r#"
//!     batch_size = 20
//!     interval_minutes = 3
//!
//!     [table]
//!     path = "contacts.csv"
//!
//!     [routing]
//!     kind = "by_locale"
//!     locale_column = 1
//!
//!     [routing.routes.EN]
//!     flow_id = "FW_EN"
//!     sender = "+15550001"
//!
//!     [routing.routes.ES]
//!     flow_id = "FW_ES"
//!     sender = "+15550002"
//! "#).unwrap();
//!
//! assert!(matches!(config.routing, RoutingConfig::ByLocale { .. }));
//! assert_eq!(config.interval().as_secs(), 180);
//! ```

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

pub use crate::messaging::Credentials;

use crate::{
    core::{cursor::CursorLayout, item::ItemProcessor},
    error::BatchError,
    item::{
        payload::{
            DynamicParameterProcessor, FixedRoutingProcessor, LocaleRoutes,
            LocaleRoutingProcessor, OutboundRequest, Route, TableRow,
        },
        result::ResultRow,
    },
    tasklet::survey::FailurePolicy,
};

/// Default API root of the messaging provider.
pub const DEFAULT_BASE_URL: &str = "https://studio.twilio.com/v1";

fn default_batch_size() -> usize {
    20
}

fn default_interval_minutes() -> u64 {
    3
}

fn default_delimiter() -> char {
    ','
}

fn default_header_rows() -> usize {
    1
}

fn default_marker_column() -> usize {
    1
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Complete description of a batch run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurveyConfig {
    /// Each invocation handles `batch_size + 1` rows.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Send the first batch when batching starts instead of one interval later.
    #[serde(default)]
    pub run_immediately: bool,
    pub table: TableConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    pub routing: RoutingConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
}

/// The contact table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub path: PathBuf,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
    #[serde(default)]
    pub recipient_column: usize,
    #[serde(default = "default_marker_column")]
    pub marker_column: usize,
}

/// Where dispatch results are recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResultsConfig {
    /// In the trailing columns of each contact row.
    #[default]
    InPlace,
    /// As rows appended to a separate table.
    Append { path: PathBuf },
}

/// How a row is turned into a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingConfig {
    Fixed {
        flow_id: String,
        sender: String,
    },
    ByLocale {
        locale_column: usize,
        routes: HashMap<String, Route>,
    },
    Dynamic {
        flow_id: String,
        sender: String,
        parameter_start_column: usize,
        /// Exclusive end; defaults to the last column before in-place results.
        #[serde(default)]
        parameter_end_column: Option<usize>,
    },
}

/// The messaging provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Prefix of both addresses, e.g. `whatsapp:`.
    #[serde(default)]
    pub channel_prefix: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            channel_prefix: String::new(),
            timeout_seconds: default_timeout_seconds(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl SurveyConfig {
    /// Reads and validates a TOML file. Relative table paths are resolved
    /// against the directory of the file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|error| {
            BatchError::Configuration(format!("Unable to read {}: {}", path.display(), error))
        })?;

        let mut config = Self::from_toml_str(&content)?;

        if let Some(base) = path.parent() {
            config.table.path = base.join(&config.table.path);
            if let ResultsConfig::Append { path } = &mut config.results {
                *path = base.join(&*path);
            }
        }

        Ok(config)
    }

    /// Parses and validates TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, BatchError> {
        let config: SurveyConfig =
            toml::from_str(content).map_err(|error| BatchError::Configuration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        let invalid = |message: String| Err(BatchError::Configuration(message));

        if self.interval_minutes == 0 {
            return invalid("interval_minutes must be at least 1".to_string());
        }
        if !self.table.delimiter.is_ascii() {
            return invalid(format!("Delimiter '{}' is not ASCII", self.table.delimiter));
        }
        if self.table.recipient_column == self.table.marker_column {
            return invalid("recipient_column and marker_column must differ".to_string());
        }

        let reserved = [self.table.recipient_column, self.table.marker_column];
        match &self.routing {
            RoutingConfig::Fixed { flow_id, .. } if flow_id.trim().is_empty() => {
                invalid("routing.flow_id must not be empty".to_string())
            }
            RoutingConfig::ByLocale {
                locale_column,
                routes,
            } => {
                if routes.is_empty() {
                    invalid("routing.routes must define at least one locale".to_string())
                } else if reserved.contains(locale_column) {
                    invalid("locale_column overlaps recipient or marker column".to_string())
                } else {
                    Ok(())
                }
            }
            RoutingConfig::Dynamic {
                flow_id,
                parameter_start_column,
                parameter_end_column,
                ..
            } => {
                let end = parameter_end_column.unwrap_or(usize::MAX);
                if flow_id.trim().is_empty() {
                    invalid("routing.flow_id must not be empty".to_string())
                } else if reserved
                    .iter()
                    .any(|column| (*parameter_start_column..end).contains(column))
                {
                    invalid("Parameter columns overlap recipient or marker column".to_string())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn layout(&self) -> CursorLayout {
        CursorLayout {
            header_rows: self.table.header_rows,
            marker_column: self.table.marker_column,
        }
    }

    /// Columns read to send a row or move the cursor. In-place results must
    /// stay to the right of all of them.
    pub fn reserved_columns(&self) -> Vec<usize> {
        let mut columns = vec![self.table.recipient_column, self.table.marker_column];
        match &self.routing {
            RoutingConfig::Fixed { .. } => {}
            RoutingConfig::ByLocale { locale_column, .. } => columns.push(*locale_column),
            RoutingConfig::Dynamic {
                parameter_start_column,
                parameter_end_column,
                ..
            } => {
                let end = parameter_end_column.unwrap_or(parameter_start_column + 1);
                columns.extend(*parameter_start_column..end);
            }
        }
        columns
    }

    pub fn delimiter(&self) -> u8 {
        self.table.delimiter as u8
    }

    /// Builds the row processor for the configured routing.
    ///
    /// `header` is the first header row and `width` the number of columns of
    /// the contact table; both are only used by dynamic parameters.
    pub fn processor(
        &self,
        header: &[String],
        width: usize,
    ) -> Result<Box<dyn ItemProcessor<TableRow, OutboundRequest>>, BatchError> {
        let prefix = self.messaging.channel_prefix.as_str();
        let recipient_column = self.table.recipient_column;

        let processor: Box<dyn ItemProcessor<TableRow, OutboundRequest>> = match &self.routing {
            RoutingConfig::Fixed { flow_id, sender } => Box::new(
                FixedRoutingProcessor::new(route(flow_id, sender), recipient_column)
                    .channel_prefix(prefix),
            ),
            RoutingConfig::ByLocale {
                locale_column,
                routes,
            } => Box::new(
                LocaleRoutingProcessor::new(
                    LocaleRoutes::from(routes.clone()),
                    recipient_column,
                    *locale_column,
                )
                .channel_prefix(prefix),
            ),
            RoutingConfig::Dynamic {
                flow_id,
                sender,
                parameter_start_column,
                parameter_end_column,
            } => {
                let end = match (parameter_end_column, &self.results) {
                    (Some(end), _) => *end,
                    (None, ResultsConfig::InPlace) => width.saturating_sub(ResultRow::WIDTH),
                    (None, ResultsConfig::Append { .. }) => width,
                };
                let processor = DynamicParameterProcessor::from_header_row(
                    route(flow_id, sender),
                    recipient_column,
                    header,
                    *parameter_start_column,
                    end,
                )
                .channel_prefix(prefix);
                if processor.parameter_names().is_empty() {
                    return Err(BatchError::Configuration(
                        "No parameter names found in the header row".to_string(),
                    ));
                }
                Box::new(processor)
            }
        };

        Ok(processor)
    }
}

fn route(flow_id: &str, sender: &str) -> Route {
    Route {
        flow_id: flow_id.to_string(),
        sender: sender.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::item::{payload::TableRow, result::InPlaceResultWriter, table::MemoryTable};

    use super::*;

    const FIXED: &str = r#"
        [table]
        path = "contacts.csv"

        [routing]
        kind = "fixed"
        flow_id = "FW1"
        sender = "+15550000"
    "#;

    #[test]
    fn defaults_should_apply() -> Result<(), BatchError> {
        let config = SurveyConfig::from_toml_str(FIXED)?;

        assert_eq!(config.batch_size, 20);
        assert_eq!(config.interval(), Duration::from_secs(180));
        assert!(!config.run_immediately);
        assert_eq!(config.layout(), CursorLayout::default());
        assert_eq!(config.results, ResultsConfig::InPlace);
        assert_eq!(config.messaging.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.messaging.failure_policy, FailurePolicy::Record);

        Ok(())
    }

    #[test]
    fn zero_interval_should_be_rejected() {
        let content = format!("interval_minutes = 0\n{}", FIXED);
        let result = SurveyConfig::from_toml_str(&content);
        assert!(matches!(result, Err(BatchError::Configuration(message)) if message.contains("interval")));
    }

    #[test]
    fn unknown_field_should_be_rejected() {
        let content = format!("batchSize = 5\n{}", FIXED);
        assert!(SurveyConfig::from_toml_str(&content).is_err());
    }

    #[test]
    fn locale_routing_without_routes_should_be_rejected() {
        let result = SurveyConfig::from_toml_str(
            r#"
            [table]
            path = "contacts.csv"
            marker_column = 2

            [routing]
            kind = "by_locale"
            locale_column = 1
            routes = {}
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn dynamic_parameters_should_stop_before_result_columns() -> Result<(), BatchError> {
        let config = SurveyConfig::from_toml_str(
            r#"
            [table]
            path = "contacts.csv"

            [routing]
            kind = "dynamic"
            flow_id = "FW1"
            sender = "+15550000"
            parameter_start_column = 2

            [messaging]
            failure_policy = "abort"
            "#,
        )?;
        let header: Vec<String> = [
            "number", "batch", "name", "timestamp", "status", "sid", "address", "url", "error",
        ]
        .iter()
        .map(|cell| cell.to_string())
        .collect();

        let processor = config.processor(&header, header.len())?;
        let row = TableRow::new(1, vec!["1555".to_string(), String::new(), "Ada".to_string()]);
        let request = processor.process(&row)?;

        assert_eq!(request.parameters.as_deref(), Some(r#"{"name":"Ada"}"#));
        assert_eq!(config.messaging.failure_policy, FailurePolicy::Abort);

        Ok(())
    }

    #[test]
    fn results_should_not_cover_reserved_columns() -> Result<(), BatchError> {
        let table = MemoryTable::from_rows(&[&[
            "number", "batch", "timestamp", "status", "sid", "address", "url",
        ]]);

        let fixed = SurveyConfig::from_toml_str(FIXED)?;
        assert_eq!(fixed.reserved_columns(), vec![0, 1]);
        assert!(InPlaceResultWriter::new(&table, 7, &fixed.reserved_columns()).is_err());

        let dynamic = SurveyConfig::from_toml_str(
            r#"
            [table]
            path = "contacts.csv"

            [routing]
            kind = "dynamic"
            flow_id = "FW1"
            sender = "+15550000"
            parameter_start_column = 2
            parameter_end_column = 5
            "#,
        )?;
        assert_eq!(dynamic.reserved_columns(), vec![0, 1, 2, 3, 4]);
        assert!(InPlaceResultWriter::new(&table, 9, &dynamic.reserved_columns()).is_err());
        assert!(InPlaceResultWriter::new(&table, 11, &dynamic.reserved_columns()).is_ok());

        Ok(())
    }

    #[test]
    fn relative_paths_should_follow_config_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("survey.toml");
        fs::write(
            &path,
            format!("[results]\nmode = \"append\"\npath = \"responses.csv\"\n{}", FIXED),
        )?;

        let config = SurveyConfig::from_path(&path)?;

        assert_eq!(config.table.path, dir.path().join("contacts.csv"));
        assert_eq!(
            config.results,
            ResultsConfig::Append {
                path: dir.path().join("responses.csv")
            }
        );

        Ok(())
    }
}
