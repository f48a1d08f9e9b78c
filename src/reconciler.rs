/// Consult reconciliation against the provider.
///
/// Every lookup is a live query; nothing is stored here. The flows are:
/// 1. Create a consult, recovering the existing one when the provider reports a duplicate
/// 2. Find a consult by document number and time window
/// 3. Resend the consent link for a consult
/// 4. Look up the available margin and translate the consult status
use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::lookup::LookupStrategy;
use crate::models::{
    normalize_document, AuthorizationResult, ConsultOutcome, ConsultRequest, ConsultStatus,
    LookupRequest, MarginResult, ReusedConsult, SearchFilter,
};
use crate::provider_client::ProviderClient;
use regex::Regex;
use std::sync::OnceLock;

/// Error `type` the provider returns when a consult for the same user and
/// document already exists. Matched by exact equality.
pub const DUPLICATE_CONSULT_ERROR_TYPE: &str = "consult_already_exists_by_user_and_document_number";

pub const CONSULT_NOT_FOUND_MESSAGE: &str = "no consult found in this period";
pub const MARGIN_NOT_FOUND_MESSAGE: &str = "no consent record found for this document in this period";

/// Consult ids are opaque provider tokens; anything outside this alphabet is
/// refused before it reaches a URL path.
fn consult_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

#[derive(Clone)]
pub struct ConsultReconciler {
    client: ProviderClient,
    lookup: LookupStrategy,
    provedor: String,
    lookback_days: i64,
}

impl ConsultReconciler {
    pub fn new(client: ProviderClient, config: &Config) -> Self {
        Self {
            client,
            lookup: config.lookup_strategy,
            provedor: config.v8_provedor.clone(),
            lookback_days: config.consult_lookback_days,
        }
    }

    fn filter(&self, document_number: &str) -> SearchFilter {
        SearchFilter::new(document_number, &self.provedor, self.lookback_days)
    }

    /// Creates a consult, or returns the existing one when the provider
    /// reports it as a duplicate.
    pub async fn create_or_reuse_consult(
        &self,
        request: ConsultRequest,
    ) -> Result<ConsultOutcome, AppError> {
        let payload = request.into_payload()?;
        let document_number = payload.borrower_document_number.clone();

        let err = match self.client.create_consult(&payload).await {
            Ok(body) => {
                tracing::info!("Consult created for document {}", document_number);
                return Ok(ConsultOutcome::Created(body));
            }
            Err(err) => err,
        };

        if err.provider_error_type() != Some(DUPLICATE_CONSULT_ERROR_TYPE) {
            tracing::error!(
                "Consult creation failed for document {}: {}",
                document_number,
                err
            );
            return Err(err);
        }

        let upstream_status = match err.root() {
            AppError::Provider {
                upstream_status, ..
            } => *upstream_status,
            _ => None,
        };
        tracing::warn!(
            "Consult already exists for document {} (upstream status {:?}), recovering via {:?}",
            document_number,
            upstream_status,
            self.lookup
        );

        let filter = self.filter(&document_number);
        let located = self
            .lookup
            .locate(&self.client, &filter)
            .await
            .with_context(|| format!("recovering duplicate consult for {}", document_number))?;

        match located {
            Some(found) => {
                tracing::info!(
                    "Recovered consult {} ({}) for document {}",
                    found.consult_id,
                    found.status,
                    document_number
                );
                Ok(ConsultOutcome::Reused(ReusedConsult {
                    consult_id: found.consult_id,
                    status: found.status,
                    reused: true,
                }))
            }
            None => Err(AppError::DuplicateUnresolved { document_number }),
        }
    }

    /// Finds the first consult for a document within the requested window.
    pub async fn find_consult(&self, request: &LookupRequest) -> Result<ReusedConsult, AppError> {
        let filter = self.lookup_filter(request)?;

        let located = self
            .lookup
            .locate(&self.client, &filter)
            .await
            .with_context(|| format!("finding consult for {}", filter.document_number))?;

        match located {
            Some(found) => Ok(ReusedConsult {
                consult_id: found.consult_id,
                status: found.status,
                reused: true,
            }),
            None => {
                tracing::warn!(
                    "No consult found for document {} between {} and {}",
                    filter.document_number,
                    filter.start,
                    filter.end
                );
                Err(AppError::NotFound(CONSULT_NOT_FOUND_MESSAGE.to_string()))
            }
        }
    }

    /// Resends the consent link. Fails fast, with no outbound call, on an
    /// empty or malformed id.
    pub async fn resend_authorization(
        &self,
        consult_id: Option<&str>,
    ) -> Result<AuthorizationResult, AppError> {
        let consult_id = consult_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Validation("consult_id is required".to_string()))?;
        if !consult_id_pattern().is_match(consult_id) {
            return Err(AppError::Validation(format!(
                "consult_id '{}' contains invalid characters",
                consult_id
            )));
        }

        let body = self
            .client
            .authorize_consult(consult_id)
            .await
            .with_context(|| format!("resending authorization for consult {}", consult_id))?;

        // The provider does not promise a status here
        let status = body
            .as_ref()
            .and_then(|b| b.get("status"))
            .and_then(|s| s.as_str())
            .map(ConsultStatus::from)
            .unwrap_or(ConsultStatus::WaitingConsent);

        Ok(AuthorizationResult {
            consult_id: consult_id.to_string(),
            status,
        })
    }

    /// Looks up the margin for a document. Only records whose document number
    /// equals the requested one exactly are considered.
    pub async fn get_margin(&self, request: &LookupRequest) -> Result<MarginResult, AppError> {
        let filter = self.lookup_filter(request)?;

        let records = self
            .client
            .list_consults(&filter)
            .await
            .with_context(|| format!("looking up margin for {}", filter.document_number))?;

        let located = records.into_iter().find_map(|r| {
            let matches = r
                .document_number
                .as_deref()
                .is_some_and(|d| normalize_document(d) == filter.document_number);
            match (matches, r.id.clone()) {
                (true, Some(consult_id)) => Some((consult_id, r)),
                _ => None,
            }
        });

        let Some((consult_id, record)) = located else {
            tracing::warn!(
                "No consent record for document {} between {} and {}",
                filter.document_number,
                filter.start,
                filter.end
            );
            return Err(AppError::NotFound(MARGIN_NOT_FOUND_MESSAGE.to_string()));
        };

        Ok(MarginResult {
            consult_id,
            status_translated: record.status.translate().to_string(),
            status: record.status,
            available_margin_value: record.available_margin_value,
        })
    }

    fn lookup_filter(&self, request: &LookupRequest) -> Result<SearchFilter, AppError> {
        let filter = self
            .filter(&request.document_number)
            .with_window(request.start_date, request.end_date)
            .with_pagination(request.page, request.limit);

        if filter.document_number.is_empty() {
            return Err(AppError::Validation(
                "document_number is required".to_string(),
            ));
        }
        if filter.start > filter.end {
            return Err(AppError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }

        Ok(filter)
    }
}
