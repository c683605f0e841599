//! Caller credentials and the once-per-job admission check.
//!
//! Admission happens before [`crate::process::process_document`] is called.
//! Page tasks never re-validate the credential.

use crate::config::{CredentialPolicy, PipelineConfig};
use crate::error::PipelineError;
use crate::pipeline::inference::model_for;
use std::fmt;
use tracing::{info, warn};

/// An API key for the inference endpoint, or the absence of one.
///
/// `Debug` never prints the key.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(Option<String>);

impl Credential {
    /// A key sent as `Authorization: Bearer <key>`.
    pub fn bearer(key: impl Into<String>) -> Self {
        Self(Some(key.into()))
    }

    /// No key. Requests go out without an `Authorization` header.
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_none()
    }

    /// The raw key, for building request headers.
    pub fn secret(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("Credential(<redacted>)"),
            None => f.write_str("Credential(anonymous)"),
        }
    }
}

/// Decide whether a job may run with the `supplied` credential.
///
/// A present credential is always probed against the endpoint once; a failed
/// probe rejects the job under either policy. A missing or blank credential
/// is rejected under [`CredentialPolicy::Strict`] and admitted anonymously
/// under [`CredentialPolicy::Permissive`].
pub async fn admit_credential(
    config: &PipelineConfig,
    supplied: Option<&str>,
) -> Result<Credential, PipelineError> {
    let key = supplied.map(str::trim).filter(|k| !k.is_empty());

    let credential = match (key, config.credential_policy) {
        (Some(k), _) => Credential::bearer(k),
        (None, CredentialPolicy::Strict) => return Err(PipelineError::MissingCredential),
        (None, CredentialPolicy::Permissive) => {
            info!("No credential supplied; admitting anonymously (permissive policy)");
            return Ok(Credential::anonymous());
        }
    };

    let model = model_for(config, &credential).map_err(|e| PipelineError::CredentialRejected {
        endpoint: config.base_url.clone(),
        detail: e.to_string(),
    })?;

    match model.probe().await {
        Ok(()) => {
            info!("Credential accepted by '{}'", config.base_url);
            Ok(credential)
        }
        Err(e) => {
            warn!("Credential rejected by '{}': {}", config.base_url, e);
            Err(PipelineError::CredentialRejected {
                endpoint: config.base_url.clone(),
                detail: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::pipeline::inference::{ModelReply, VisionModel, VisionRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ProbeOnly {
        accept: bool,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl VisionModel for ProbeOnly {
        async fn complete(&self, _request: VisionRequest) -> Result<ModelReply, InferenceError> {
            Err(InferenceError::Transport("not used".into()))
        }

        async fn probe(&self) -> Result<(), InferenceError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.accept {
                Ok(())
            } else {
                Err(InferenceError::Api {
                    status: 401,
                    body: "invalid api key".into(),
                })
            }
        }
    }

    fn config(accept: bool, policy: CredentialPolicy) -> (PipelineConfig, Arc<ProbeOnly>) {
        let model = Arc::new(ProbeOnly {
            accept,
            probes: AtomicUsize::new(0),
        });
        let config = PipelineConfig::builder()
            .credential_policy(policy)
            .model_client(model.clone())
            .build()
            .unwrap();
        (config, model)
    }

    #[test]
    fn debug_is_redacted() {
        let s = format!("{:?}", Credential::bearer("sk-secret"));
        assert!(!s.contains("sk-secret"));
        assert_eq!(format!("{:?}", Credential::anonymous()), "Credential(anonymous)");
    }

    #[tokio::test]
    async fn strict_rejects_missing() {
        let (config, model) = config(true, CredentialPolicy::Strict);
        let err = admit_credential(&config, Some("   ")).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential));
        assert_eq!(model.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn permissive_admits_missing_without_probe() {
        let (config, model) = config(false, CredentialPolicy::Permissive);
        let cred = admit_credential(&config, None).await.unwrap();
        assert!(cred.is_anonymous());
        assert_eq!(model.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn present_credential_is_probed() {
        let (config, model) = config(true, CredentialPolicy::Strict);
        let cred = admit_credential(&config, Some(" sk-ok ")).await.unwrap();
        assert_eq!(cred.secret(), Some("sk-ok"));
        assert_eq!(model.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_probe_rejects_under_both_policies() {
        for policy in [CredentialPolicy::Strict, CredentialPolicy::Permissive] {
            let (config, _) = config(false, policy);
            let err = admit_credential(&config, Some("sk-bad")).await.unwrap_err();
            match err {
                PipelineError::CredentialRejected { detail, .. } => {
                    assert!(detail.contains("401"));
                }
                other => panic!("unexpected: {other}"),
            }
        }
    }
}
