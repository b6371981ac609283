pub mod client;
pub mod policy;

pub use client::{ExtractClient, ExtractConfig};
pub use policy::{RetryPolicy, with_inline_fallback, with_retry};

use crate::schema::{AttributeBag, MetaCategory, MetaCategoryTemplate, SchemaViolation};
use thiserror::Error;

/// Failure taxonomy for one structured-extraction call. The retry and
/// fallback policies key off two disjoint classes; everything else is fatal
/// for the row.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("remote image rejected: {0}")]
    InvalidImage(String),
    #[error("remote side timed out downloading the asset: {0}")]
    AssetTimeout(String),
    #[error("asset fetch for inline fallback failed: {0}")]
    AssetFetch(String),
    #[error("inference endpoint returned HTTP {status}: {detail}")]
    Gateway { status: u16, detail: String },
    #[error("malformed inference envelope: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
}

impl ExtractError {
    /// Connectivity-class failures: retried with exponential backoff.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ExtractError::Connect(_) | ExtractError::Protocol(_))
    }

    /// Failures that warrant exactly one resubmission through the
    /// inline-payload endpoint.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            ExtractError::InvalidImage(_) | ExtractError::AssetTimeout(_)
        )
    }
}

/// Closed capability set of the inference transport. The orchestrator is
/// generic over this so batches can run against a fake in tests.
pub trait Extractor {
    fn extract_from_text(
        &self,
        name: &str,
        template: &'static MetaCategoryTemplate,
        cache_key: Option<&str>,
    ) -> impl Future<Output = Result<AttributeBag, ExtractError>> + Send;

    fn extract_from_image(
        &self,
        image_url: &str,
        description: &str,
        template: &'static MetaCategoryTemplate,
        cache_key: Option<&str>,
    ) -> impl Future<Output = Result<AttributeBag, ExtractError>> + Send;

    /// Classifies an item name into a meta-category, for corpus rows the
    /// upstream export left untagged.
    fn classify_meta(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<MetaCategory, ExtractError>> + Send;
}
