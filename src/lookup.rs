//! Locating an existing consult for a borrower document.
//!
//! The provider exposes two listings that can resolve a document number to a
//! consult id: the consult search itself, and the operation listing, where the
//! consult id hangs off the borrower's operation record. Which one is
//! authoritative is a deployment choice, so both sit behind [`LookupStrategy`].

use crate::errors::AppError;
use crate::models::{normalize_document, ConsultStatus, SearchFilter};
use crate::provider_client::ProviderClient;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    /// `GET /consult?search=<document>`; first record wins.
    #[default]
    ConsultSearch,
    /// `GET /operation`, filtered here on `borrower.documentNumber`.
    OperationListing,
}

impl FromStr for LookupStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consult" | "consult_search" => Ok(LookupStrategy::ConsultSearch),
            "operation" | "operation_listing" => Ok(LookupStrategy::OperationListing),
            other => anyhow::bail!(
                "unknown lookup strategy '{}' (expected 'consult' or 'operation')",
                other
            ),
        }
    }
}

/// A consult resolved from one of the provider listings.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedConsult {
    pub consult_id: String,
    pub status: ConsultStatus,
}

impl LookupStrategy {
    pub async fn locate(
        &self,
        client: &ProviderClient,
        filter: &SearchFilter,
    ) -> Result<Option<LocatedConsult>, AppError> {
        match self {
            LookupStrategy::ConsultSearch => {
                let records = client.list_consults(filter).await?;
                // Records that carry a different document are skipped; records
                // without one are trusted to the server-side search. A record
                // without an id cannot be reused.
                Ok(records.into_iter().find_map(|r| {
                    let matches = r
                        .document_number
                        .as_deref()
                        .map_or(true, |d| normalize_document(d) == filter.document_number);
                    match (matches, r.id) {
                        (true, Some(consult_id)) => Some(LocatedConsult {
                            consult_id,
                            status: r.status,
                        }),
                        _ => None,
                    }
                }))
            }
            LookupStrategy::OperationListing => {
                let operations = client.list_operations(filter).await?;
                Ok(operations.into_iter().find_map(|op| {
                    let matches = op
                        .borrower
                        .as_ref()
                        .and_then(|b| b.document_number.as_deref())
                        .is_some_and(|d| normalize_document(d) == filter.document_number);
                    match (matches, op.consult_id) {
                        (true, Some(consult_id)) if !consult_id.is_empty() => Some(LocatedConsult {
                            consult_id,
                            status: op.status,
                        }),
                        _ => None,
                    }
                }))
            }
        }
    }
}
