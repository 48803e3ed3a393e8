//! # Outbound payloads
//!
//! Each table row becomes one [`OutboundRequest`]. Three processors cover the
//! ways a row can be routed:
//!
//! - [`FixedRoutingProcessor`]: every row goes to the same flow and sender.
//! - [`LocaleRoutingProcessor`]: the row's locale code selects flow and sender.
//! - [`DynamicParameterProcessor`]: fixed routing, plus a parameter map built
//!   from the header row and the row's cells.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    core::item::{ItemProcessor, ItemProcessorResult},
    error::BatchError,
    item::table::Row,
};

/// A data row together with its 0-based position in the table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub index: usize,
    pub cells: Row,
}

impl TableRow {
    pub fn new(index: usize, cells: Row) -> Self {
        Self { index, cells }
    }

    fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

/// One outbound message request.
///
/// Serializes into the form fields expected by the messaging API
/// (`To`, `From`, and optionally `Parameters` as a JSON string).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundRequest {
    #[serde(skip)]
    pub flow_id: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Parameters", skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

/// Flow and sender used for a group of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Route {
    pub flow_id: String,
    pub sender: String,
}

/// Routes keyed by locale code.
///
/// Codes are normalised (trimmed, upper-cased) on insert and on lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleRoutes {
    routes: HashMap<String, Route>,
}

impl LocaleRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, locale: &str, route: Route) -> Self {
        self.insert(locale, route);
        self
    }

    pub fn insert(&mut self, locale: &str, route: Route) {
        self.routes.insert(normalize_locale(locale), route);
    }

    pub fn get(&self, locale: &str) -> Option<&Route> {
        self.routes.get(&normalize_locale(locale))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl From<HashMap<String, Route>> for LocaleRoutes {
    fn from(map: HashMap<String, Route>) -> Self {
        map.into_iter()
            .fold(LocaleRoutes::new(), |routes, (locale, route)| {
                routes.with_route(&locale, route)
            })
    }
}

fn normalize_locale(locale: &str) -> String {
    locale.trim().to_ascii_uppercase()
}

/// Formats a recipient as `prefix + "+" + number`, tolerating a number that
/// already starts with `+`.
fn recipient_address(row: &TableRow, column: usize, channel_prefix: &str) -> ItemProcessorResult<String> {
    let number = row.cell(column).trim().trim_start_matches('+');
    if number.is_empty() {
        return Err(BatchError::ItemProcessor(format!(
            "Row {} has no recipient in column {}",
            row.index, column
        )));
    }
    Ok(format!("{}+{}", channel_prefix, number))
}

/// Every row is sent to the same flow from the same sender.
#[derive(Debug, Clone)]
pub struct FixedRoutingProcessor {
    route: Route,
    recipient_column: usize,
    channel_prefix: String,
}

impl FixedRoutingProcessor {
    pub fn new(route: Route, recipient_column: usize) -> Self {
        Self {
            route,
            recipient_column,
            channel_prefix: String::new(),
        }
    }

    /// Prefix put in front of both addresses, e.g. `whatsapp:`.
    pub fn channel_prefix(mut self, prefix: &str) -> Self {
        self.channel_prefix = prefix.to_string();
        self
    }
}

impl ItemProcessor<TableRow, OutboundRequest> for FixedRoutingProcessor {
    fn process(&self, item: &TableRow) -> ItemProcessorResult<OutboundRequest> {
        Ok(OutboundRequest {
            flow_id: self.route.flow_id.clone(),
            to: recipient_address(item, self.recipient_column, &self.channel_prefix)?,
            from: format!("{}{}", self.channel_prefix, self.route.sender),
            parameters: None,
        })
    }
}

/// Chooses flow and sender from the locale code found on the row.
///
/// A code without a configured route is rejected with
/// [`BatchError::UnknownLocale`].
#[derive(Debug, Clone)]
pub struct LocaleRoutingProcessor {
    routes: LocaleRoutes,
    recipient_column: usize,
    locale_column: usize,
    channel_prefix: String,
}

impl LocaleRoutingProcessor {
    pub fn new(routes: LocaleRoutes, recipient_column: usize, locale_column: usize) -> Self {
        Self {
            routes,
            recipient_column,
            locale_column,
            channel_prefix: String::new(),
        }
    }

    pub fn channel_prefix(mut self, prefix: &str) -> Self {
        self.channel_prefix = prefix.to_string();
        self
    }
}

impl ItemProcessor<TableRow, OutboundRequest> for LocaleRoutingProcessor {
    fn process(&self, item: &TableRow) -> ItemProcessorResult<OutboundRequest> {
        let locale = item.cell(self.locale_column);
        let route = self
            .routes
            .get(locale)
            .ok_or_else(|| BatchError::UnknownLocale {
                locale: locale.to_string(),
                row: item.index,
            })?;

        debug!("Row {} routed to flow {} ({})", item.index, route.flow_id, locale);

        Ok(OutboundRequest {
            flow_id: route.flow_id.clone(),
            to: recipient_address(item, self.recipient_column, &self.channel_prefix)?,
            from: format!("{}{}", self.channel_prefix, route.sender),
            parameters: None,
        })
    }
}

/// Fixed routing plus a `Parameters` JSON object built from the row.
///
/// Parameter names come from the header row; each parameter takes the value
/// of the row's cell in the same column.
#[derive(Debug, Clone)]
pub struct DynamicParameterProcessor {
    route: Route,
    recipient_column: usize,
    channel_prefix: String,
    parameters: Vec<(usize, String)>,
}

impl DynamicParameterProcessor {
    /// Uses the header cells in `start_column..end_column` as parameter names.
    /// Columns with an empty header are skipped.
    pub fn from_header_row(
        route: Route,
        recipient_column: usize,
        header: &[String],
        start_column: usize,
        end_column: usize,
    ) -> Self {
        let end_column = end_column.min(header.len());
        let parameters = (start_column..end_column)
            .filter_map(|column| {
                let name = header[column].trim();
                (!name.is_empty()).then(|| (column, name.to_string()))
            })
            .collect();

        Self {
            route,
            recipient_column,
            channel_prefix: String::new(),
            parameters,
        }
    }

    pub fn channel_prefix(mut self, prefix: &str) -> Self {
        self.channel_prefix = prefix.to_string();
        self
    }

    /// Parameter names in column order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|(_, name)| name.as_str()).collect()
    }
}

impl ItemProcessor<TableRow, OutboundRequest> for DynamicParameterProcessor {
    fn process(&self, item: &TableRow) -> ItemProcessorResult<OutboundRequest> {
        let mut params = Map::new();
        for (column, name) in &self.parameters {
            params.insert(name.clone(), Value::String(item.cell(*column).to_string()));
        }

        let parameters = serde_json::to_string(&params)
            .map_err(|error| BatchError::ItemProcessor(error.to_string()))?;

        Ok(OutboundRequest {
            flow_id: self.route.flow_id.clone(),
            to: recipient_address(item, self.recipient_column, &self.channel_prefix)?,
            from: format!("{}{}", self.channel_prefix, self.route.sender),
            parameters: Some(parameters),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn row(index: usize, cells: &[&str]) -> TableRow {
        TableRow::new(index, cells.iter().map(|cell| cell.to_string()).collect())
    }

    fn route(flow_id: &str, sender: &str) -> Route {
        Route {
            flow_id: flow_id.to_string(),
            sender: sender.to_string(),
        }
    }

    #[test]
    fn fixed_routing_should_prefix_recipient() -> Result<(), BatchError> {
        let processor = FixedRoutingProcessor::new(route("FW123", "+15550000"), 0);

        let request = processor.process(&row(1, &["15551234", ""]))?;

        assert_eq!(request.flow_id, "FW123");
        assert_eq!(request.to, "+15551234");
        assert_eq!(request.from, "+15550000");
        assert_eq!(request.parameters, None);

        Ok(())
    }

    #[test]
    fn existing_plus_sign_should_not_be_doubled() -> Result<(), BatchError> {
        let processor =
            FixedRoutingProcessor::new(route("FW123", "+15550000"), 0).channel_prefix("whatsapp:");

        let request = processor.process(&row(1, &[" +15551234 "]))?;

        assert_eq!(request.to, "whatsapp:+15551234");
        assert_eq!(request.from, "whatsapp:+15550000");

        Ok(())
    }

    #[test]
    fn empty_recipient_should_be_rejected() {
        let processor = FixedRoutingProcessor::new(route("FW123", "+15550000"), 0);

        let result = processor.process(&row(3, &["", "NextBatchStart"]));

        assert!(matches!(result, Err(BatchError::ItemProcessor(_))));
    }

    #[test]
    fn locale_should_select_route() -> Result<(), BatchError> {
        let routes = LocaleRoutes::new()
            .with_route("EN", route("FW_EN", "+1000"))
            .with_route("es", route("FW_ES", "+2000"));
        let processor = LocaleRoutingProcessor::new(routes, 0, 1).channel_prefix("whatsapp:");

        let request = processor.process(&row(2, &["15551234", "ES", ""]))?;

        assert_eq!(request.flow_id, "FW_ES");
        assert_eq!(request.to, "whatsapp:+15551234");
        assert_eq!(request.from, "whatsapp:+2000");

        Ok(())
    }

    #[test]
    fn unknown_locale_should_be_an_explicit_error() {
        let routes = LocaleRoutes::new().with_route("EN", route("FW_EN", "+1000"));
        let processor = LocaleRoutingProcessor::new(routes, 0, 1);

        let result = processor.process(&row(4, &["15551234", "DE", ""]));

        match result {
            Err(BatchError::UnknownLocale { locale, row }) => {
                assert_eq!(locale, "DE");
                assert_eq!(row, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parameters_should_follow_header_row() -> Result<(), BatchError> {
        let header: Row = ["number", "batch", "first_name", "", "city", "timestamp"]
            .iter()
            .map(|cell| cell.to_string())
            .collect();
        let processor =
            DynamicParameterProcessor::from_header_row(route("FW1", "+1000"), 0, &header, 2, 5);

        assert_eq!(processor.parameter_names(), vec!["first_name", "city"]);

        let request = processor.process(&row(1, &["15551234", "", "Ada", "x", "Lyon", ""]))?;
        let parameters: Value = serde_json::from_str(request.parameters.as_deref().unwrap_or(""))
            .map_err(|error| BatchError::ItemProcessor(error.to_string()))?;

        assert_eq!(parameters, json!({"first_name": "Ada", "city": "Lyon"}));

        Ok(())
    }

    #[test]
    fn request_should_serialize_as_form_fields() {
        let request = OutboundRequest {
            flow_id: "FW1".to_string(),
            to: "+1555".to_string(),
            from: "+1000".to_string(),
            parameters: None,
        };

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value, json!({"To": "+1555", "From": "+1000"}));
    }
}
