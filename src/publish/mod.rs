use crate::review::{Comment, Review};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TOKEN_VAR: &str = "GH_REVIEW_API_TOKEN";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("git-pr-review/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{0} environment variable not set")]
    MissingToken(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("review rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, PublishError>;

/// Request body for the "create a review" endpoint.
#[derive(Debug, Serialize)]
pub struct ReviewPayload<'a> {
    pub body: &'a str,
    pub comments: &'a [Comment],
}

impl<'a> From<&'a Review> for ReviewPayload<'a> {
    fn from(review: &'a Review) -> Self {
        ReviewPayload {
            body: review.body(),
            comments: review.comments(),
        }
    }
}

/// Raw outcome of a publish request, whatever the status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResponse {
    pub status: u16,
    pub body: String,
}

impl PublishResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into `PublishError::Rejected`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PublishError::Rejected {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Sends a finished draft to the hosting service.
pub trait Publisher {
    /// Submit `review` in one request.
    ///
    /// Non-2xx responses are returned, not raised; only transport and
    /// credential problems are errors here.
    fn publish(&self, review: &Review) -> Result<PublishResponse>;
}

/// Where the API token comes from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Read from this environment variable on every publish.
    Env(String),
    Static(String),
}

impl TokenSource {
    fn resolve(&self) -> Result<String> {
        match self {
            TokenSource::Env(var) => match std::env::var(var) {
                Ok(token) if !token.is_empty() => Ok(token),
                _ => Err(PublishError::MissingToken(var.clone())),
            },
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        TokenSource::Env(DEFAULT_TOKEN_VAR.to_string())
    }
}

/// Publishes through the GitHub REST API.
pub struct GitHubPublisher {
    client: Client,
    api_url: String,
    token: TokenSource,
}

impl GitHubPublisher {
    pub fn new(api_url: impl Into<String>, token: TokenSource, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn reviews_url(&self, review: &Review) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.api_url,
            review.owner(),
            review.repo(),
            review.pr_number()
        )
    }
}

impl Publisher for GitHubPublisher {
    fn publish(&self, review: &Review) -> Result<PublishResponse> {
        let token = self.token.resolve()?;
        let url = self.reviews_url(review);
        log::debug!(
            "posting review with {} comments to {}",
            review.comments().len(),
            url
        );

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, ACCEPT_GITHUB_JSON)
            .header(AUTHORIZATION, format!("token {}", token))
            .json(&ReviewPayload::from(review))
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        log::info!("publish of PR #{} returned {}", review.pr_number(), status);
        Ok(PublishResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::Side;
    use mockito::Matcher;
    use serde_json::json;

    fn review() -> Review {
        let mut review = Review::blank("acme", "widgets", 42);
        review.set_body("Looks good");
        review.add_comment(
            Comment::new("src/a.py", 10, Side::Right)
                .unwrap()
                .with_body("fix this"),
        );
        review.add_comment(
            Comment::spanning("src/b.py", 3, 6, Side::Left)
                .unwrap()
                .with_body("why?"),
        );
        review
    }

    fn publisher(url: &str) -> GitHubPublisher {
        GitHubPublisher::new(
            url,
            TokenSource::Static("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn payload_contains_only_body_and_comments() {
        let review = review();
        let value = serde_json::to_value(ReviewPayload::from(&review)).unwrap();
        assert_eq!(
            value,
            json!({
                "body": "Looks good",
                "comments": [
                    {"body": "fix this", "path": "src/a.py", "line": 10, "side": "RIGHT",
                     "start_line": null, "start_side": null},
                    {"body": "why?", "path": "src/b.py", "line": 6, "side": "LEFT",
                     "start_line": 3, "start_side": "LEFT"}
                ]
            })
        );
    }

    #[test]
    fn reviews_url_trims_trailing_slash() {
        let publisher = publisher("https://api.example.com/");
        assert_eq!(
            publisher.reviews_url(&review()),
            "https://api.example.com/repos/acme/widgets/pulls/42/reviews"
        );
    }

    #[test]
    fn publish_posts_review_with_headers() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/repos/acme/widgets/pulls/42/reviews")
            .match_header("authorization", "token secret")
            .match_header("accept", ACCEPT_GITHUB_JSON)
            .match_header("user-agent", Matcher::Regex("^git-pr-review/".to_string()))
            .match_body(Matcher::PartialJson(json!({"body": "Looks good"})))
            .with_status(200)
            .with_body(r#"{"id": 1, "state": "PENDING"}"#)
            .create();

        let response = publisher(&server.url()).publish(&review()).unwrap();
        mock.assert();
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert!(response.body.contains("PENDING"));
    }

    #[test]
    fn publish_returns_rejection_as_response() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/repos/acme/widgets/pulls/42/reviews")
            .with_status(422)
            .with_body(r#"{"message": "Validation Failed"}"#)
            .create();

        let response = publisher(&server.url()).publish(&review()).unwrap();
        mock.assert();
        assert_eq!(response.status, 422);
        assert!(!response.is_success());

        let err = response.error_for_status().unwrap_err();
        assert!(matches!(err, PublishError::Rejected { status: 422, .. }));
        assert!(err.to_string().contains("Validation Failed"));
    }

    #[test]
    fn missing_env_token_is_reported_before_sending() {
        let publisher = GitHubPublisher::new(
            "http://127.0.0.1:9",
            TokenSource::Env("GIT_PR_REVIEW_TEST_UNSET_TOKEN".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = publisher.publish(&review()).unwrap_err();
        assert!(matches!(err, PublishError::MissingToken(ref var) if var == "GIT_PR_REVIEW_TEST_UNSET_TOKEN"));
    }
}
