//! Maps provider errors onto the caller-facing failure taxonomy
//!
//! Classification uses the provider's machine-readable code and error kind.
//! Messages are never inspected.

use super::types::{codes, ClassifiedFailure, ProviderError};

pub fn classify(error: &ProviderError) -> ClassifiedFailure {
    match error {
        ProviderError::InteractionRequired { .. } => ClassifiedFailure::InteractionRequired,
        ProviderError::Client { code, .. } | ProviderError::Other { code, .. }
            if code == codes::AUTHENTICATION_CANCELED =>
        {
            ClassifiedFailure::Cancelled
        }
        ProviderError::Service { code, .. } => {
            ClassifiedFailure::ProviderServiceError { code: code.clone() }
        }
        ProviderError::Client { code, .. } => {
            ClassifiedFailure::ProviderClientError { code: code.clone() }
        }
        ProviderError::Other { code, .. } => ClassifiedFailure::ProviderError { code: code.clone() },
    }
}
