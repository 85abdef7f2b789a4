//! Signs storage URLs so clients can fetch study files without credentials.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to build URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("URL signer request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub enum UrlSigner {
    /// Builds plain URLs under a base, for local development.
    Static { base_url: Url },
    /// Asks an HTTP endpoint to sign each object path.
    Remote {
        endpoint: Url,
        token: String,
        client: reqwest::Client,
    },
}

#[derive(Serialize)]
struct SignRequest<'a> {
    bucket: &'a str,
    object: &'a str,
    expires_in: i64,
}

#[derive(Deserialize)]
struct SignResponse {
    url: String,
}

impl UrlSigner {
    /// # Errors
    pub fn new(
        signer_url: Option<&str>,
        storage_base_url: &str,
        token: &str,
        client: reqwest::Client,
    ) -> Result<Self, Error> {
        let signer = match signer_url {
            Some(endpoint) => Self::Remote {
                endpoint: Url::parse(endpoint)?,
                token: token.to_string(),
                client,
            },
            None => {
                let mut base_url = Url::parse(storage_base_url)?;
                if !base_url.path().ends_with('/') {
                    base_url.set_path(&format!("{}/", base_url.path()));
                }
                Self::Static { base_url }
            }
        };

        Ok(signer)
    }

    /// Returns a URL for `object` in `bucket`, valid for `expires_in`.
    ///
    /// # Errors
    pub async fn sign(&self, bucket: &str, object: &str, expires_in: Duration) -> Result<String, Error> {
        match self {
            Self::Static { base_url } => Ok(base_url.join(&format!("{bucket}/{object}"))?.to_string()),
            Self::Remote {
                endpoint,
                token,
                client,
            } => {
                let request = SignRequest {
                    bucket,
                    object,
                    expires_in: expires_in.num_seconds(),
                };

                let response: SignResponse = client
                    .post(endpoint.clone())
                    .bearer_auth(token)
                    .json(&request)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;

                Ok(response.url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("http://localhost:8000/storage")]
    #[case("http://localhost:8000/storage/")]
    #[tokio::test]
    async fn static_urls_join_bucket_and_object(#[case] base: &str) {
        let signer = UrlSigner::new(None, base, "", reqwest::Client::new()).unwrap();

        let url = signer
            .sign("SCP1", "cluster.txt", Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(url, "http://localhost:8000/storage/SCP1/cluster.txt");
    }
}
