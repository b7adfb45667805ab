use serde::Deserialize;

/// Pull-request lifecycle transitions the bot distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    Closed,
    #[serde(other)]
    Other,
}

/// A verified pull-request event, reduced to the fields the dispatcher acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub action: PullRequestAction,
    pub pull_request_number: u64,
    pub repository_full_name: String,
    pub head_branch: String,
    pub installation_id: u64,
}

// Raw payload shape. Everything is optional so that unrelated deliveries
// decode cleanly and are classified as "no pull-request context".

#[derive(Debug, Deserialize)]
struct EventPayload {
    action: Option<PullRequestAction>,
    pull_request: Option<PullRequestPayload>,
    repository: Option<RepositoryPayload>,
    installation: Option<InstallationPayload>,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct InstallationPayload {
    id: u64,
}

impl WebhookEvent {
    /// Parse a delivery body.
    ///
    /// `Ok(None)` means the payload is valid JSON but lacks pull-request context
    /// (no `pull_request`, `repository`, `installation` or `action`).
    pub fn parse(payload: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let raw: EventPayload = serde_json::from_slice(payload)?;

        let (Some(action), Some(pr), Some(repo), Some(installation)) =
            (raw.action, raw.pull_request, raw.repository, raw.installation)
        else {
            return Ok(None);
        };

        Ok(Some(WebhookEvent {
            action,
            pull_request_number: pr.number,
            repository_full_name: repo.full_name,
            head_branch: pr.head.ref_name,
            installation_id: installation.id,
        }))
    }
}
