//! Generation strategy that turns IAM credentials into a DSN.

use std::fmt;
use std::sync::Arc;

use iamdsn_cache::{GenerationError, GenerationStrategy};

use crate::dsn::{DsnBuilder, DsnRequest, DsnTarget};
use crate::provider::CredentialProvider;

/// Issues credentials for a fixed target and hands them to a [`DsnBuilder`].
///
/// Every call goes back to the provider, so rotated credentials are picked up
/// on the next refresh.
pub struct IamDsnStrategy {
    target: DsnTarget,
    provider: Arc<dyn CredentialProvider>,
    builder: Arc<dyn DsnBuilder>,
}

impl IamDsnStrategy {
    /// Strategy for `target`; `target.params` should already carry `tls`.
    pub fn new(
        target: DsnTarget,
        provider: Arc<dyn CredentialProvider>,
        builder: Arc<dyn DsnBuilder>,
    ) -> Self {
        Self {
            target,
            provider,
            builder,
        }
    }

    /// Database the DSNs are generated for.
    pub fn target(&self) -> &DsnTarget {
        &self.target
    }
}

impl GenerationStrategy for IamDsnStrategy {
    fn generate(&self) -> Result<String, GenerationError> {
        let issued = self.provider.issue(&self.target)?;
        if issued.region.trim().is_empty() {
            return Err(GenerationError::issuance("provider returned an empty region"));
        }
        if issued.credentials.access_key_id().is_empty() {
            return Err(GenerationError::issuance(
                "provider returned an empty access key id",
            ));
        }

        let endpoint = self.target.endpoint();
        let dsn = self.builder.build(&DsnRequest {
            endpoint: &endpoint,
            region: &issued.region,
            user: &self.target.user,
            db_name: &self.target.db_name,
            params: &self.target.params,
            credentials: &issued.credentials,
        })?;

        if dsn.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(dsn)
    }
}

impl fmt::Debug for IamDsnStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamDsnStrategy")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsn::{IamDsnBuilder, format_dsn};
    use crate::provider::{AwsCredentials, IssuedCredentials, MockCredentialProvider};
    use chrono::{TimeZone, Utc};
    use iamdsn_cache::ManualClock;
    use pretty_assertions::assert_eq;

    fn target() -> DsnTarget {
        DsnTarget::new("db.example.com", 3306, "app", "orders").with_params([("tls", "rds")])
    }

    fn issuing(region: &'static str) -> MockCredentialProvider {
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_issue()
            .withf(|target| target.db_name == "orders")
            .times(1)
            .returning(move |_| {
                Ok(IssuedCredentials::new(
                    AwsCredentials::new("AKID", "secret"),
                    region,
                ))
            });
        provider
    }

    fn echo_builder() -> Arc<dyn DsnBuilder> {
        struct Echo;
        impl DsnBuilder for Echo {
            fn build(&self, request: &DsnRequest<'_>) -> Result<String, GenerationError> {
                Ok(format_dsn(
                    request.user,
                    request.region,
                    request.endpoint,
                    request.db_name,
                    request.params,
                ))
            }
        }
        Arc::new(Echo)
    }

    #[test]
    fn passes_target_and_region_to_builder() {
        let strategy = IamDsnStrategy::new(target(), Arc::new(issuing("eu-west-1")), echo_builder());

        assert_eq!(
            strategy.generate().unwrap(),
            "app:eu-west-1@tcp(db.example.com:3306)/orders?tls=rds"
        );
    }

    #[test]
    fn signs_with_iam_builder() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let strategy = IamDsnStrategy::new(
            target(),
            Arc::new(issuing("eu-west-1")),
            Arc::new(IamDsnBuilder::with_clock(clock)),
        );

        let dsn = strategy.generate().unwrap();

        assert!(dsn.contains("%2Feu-west-1%2Frds-db%2Faws4_request"));
        assert!(dsn.ends_with("@tcp(db.example.com:3306)/orders?tls=rds"));
    }

    #[test]
    fn provider_failure_is_surfaced_unchanged() {
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_issue()
            .times(1)
            .returning(|_| Err(GenerationError::issuance("access denied")));
        let strategy = IamDsnStrategy::new(target(), Arc::new(provider), echo_builder());

        let err = strategy.generate().unwrap_err();

        assert!(matches!(err, GenerationError::Issuance { .. }));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn empty_region_is_an_issuance_failure() {
        let strategy = IamDsnStrategy::new(target(), Arc::new(issuing("")), echo_builder());

        assert!(matches!(
            strategy.generate(),
            Err(GenerationError::Issuance { .. })
        ));
    }

    #[test]
    fn empty_dsn_is_reported_as_empty() {
        let empty: Arc<dyn DsnBuilder> = {
            struct Blank;
            impl DsnBuilder for Blank {
                fn build(&self, _: &DsnRequest<'_>) -> Result<String, GenerationError> {
                    Ok(String::new())
                }
            }
            Arc::new(Blank)
        };
        let strategy = IamDsnStrategy::new(target(), Arc::new(issuing("us-east-1")), empty);

        assert!(matches!(strategy.generate(), Err(GenerationError::Empty)));
    }

    #[test]
    fn debug_hides_collaborators() {
        let strategy =
            IamDsnStrategy::new(target(), Arc::new(MockCredentialProvider::new()), echo_builder());

        let rendered = format!("{strategy:?}");

        assert!(rendered.contains("db.example.com"));
        assert!(rendered.contains(".."));
    }
}
