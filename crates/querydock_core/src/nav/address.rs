//! Query-string codec for the navigable address.
//!
//! # Invariants
//! - Empty parameter values are treated as absent.
//! - Parameters this module does not own are preserved in their original order.
//! - Output order is `folderId`, `tableId`, `queryId`, then everything else.

use crate::model::entity::{FolderId, QueryId, TableId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const FOLDER_PARAM: &str = "folderId";
pub const TABLE_PARAM: &str = "tableId";
pub const QUERY_PARAM: &str = "queryId";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Percent-decoding produced invalid UTF-8.
    InvalidEncoding(String),
}

impl Display for AddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEncoding(raw) => write!(f, "invalid percent-encoding: {raw}"),
        }
    }
}

impl Error for AddressError {}

/// Parsed navigable address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub folder_id: Option<FolderId>,
    pub table_id: Option<TableId>,
    pub query_id: Option<QueryId>,
    other: Vec<(String, String)>,
}

impl Address {
    pub fn new(
        folder_id: Option<FolderId>,
        table_id: Option<TableId>,
        query_id: Option<QueryId>,
    ) -> Self {
        Self {
            folder_id,
            table_id,
            query_id,
            other: Vec::new(),
        }
    }

    /// Parses a query string with or without the leading `?`.
    ///
    /// The first occurrence of a repeated owned parameter wins.
    pub fn parse(query: &str) -> Result<Self, AddressError> {
        let mut address = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key)?;
            let value = decode_component(raw_value)?;
            match key.as_str() {
                FOLDER_PARAM => {
                    if address.folder_id.is_none() && !value.is_empty() {
                        address.folder_id = Some(FolderId::new(value));
                    }
                }
                TABLE_PARAM => {
                    if address.table_id.is_none() && !value.is_empty() {
                        address.table_id = Some(TableId::new(value));
                    }
                }
                QUERY_PARAM => {
                    if address.query_id.is_none() && !value.is_empty() {
                        address.query_id = Some(QueryId::new(value));
                    }
                }
                _ => address.other.push((key, value)),
            }
        }
        Ok(address)
    }

    /// Parameters not owned by the selection binding.
    pub fn other_params(&self) -> &[(String, String)] {
        &self.other
    }

    /// Renders without the leading `?`; empty when nothing is set.
    pub fn to_query_string(&self) -> String {
        let owned = [
            (FOLDER_PARAM, self.folder_id.as_ref().map(FolderId::as_str)),
            (TABLE_PARAM, self.table_id.as_ref().map(TableId::as_str)),
            (QUERY_PARAM, self.query_id.as_ref().map(QueryId::as_str)),
        ];
        owned
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value)))
            .chain(
                self.other
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            )
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn is_empty(&self) -> bool {
        self.folder_id.is_none()
            && self.table_id.is_none()
            && self.query_id.is_none()
            && self.other.is_empty()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

fn decode_component(raw: &str) -> Result<String, AddressError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| AddressError::InvalidEncoding(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{Address, AddressError};
    use crate::model::entity::{FolderId, QueryId, TableId};

    #[test]
    fn parse_reads_owned_params_and_keeps_others() {
        let address = Address::parse("?tab=sql&tableId=t1&queryId=q%205&folderId=").unwrap();
        assert_eq!(address.table_id, Some(TableId::new("t1")));
        assert_eq!(address.query_id, Some(QueryId::new("q 5")));
        assert_eq!(address.folder_id, None);
        assert_eq!(
            address.other_params(),
            &[("tab".to_string(), "sql".to_string())]
        );
    }

    #[test]
    fn render_uses_canonical_order() {
        let mut address = Address::parse("view=compact&queryId=q1").unwrap();
        address.table_id = Some(TableId::new("t 1"));
        address.folder_id = Some(FolderId::new("f1"));
        assert_eq!(
            address.to_query_string(),
            "folderId=f1&tableId=t%201&queryId=q1&view=compact"
        );
    }

    #[test]
    fn empty_address_renders_empty_string() {
        let address = Address::parse("").unwrap();
        assert!(address.is_empty());
        assert_eq!(address.to_query_string(), "");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = Address::parse("tableId=%FF").unwrap_err();
        assert_eq!(err, AddressError::InvalidEncoding("%FF".to_string()));
    }
}
