use anyhow::Context;
use async_trait::async_trait;
use firewatch_core::{Incident, IncidentDraft, IncidentPatch};

/// Abstract bulk-read + write surface of the remote incident system.
///
/// Any concrete backend (REST, message-queue, polling) satisfies this
/// contract; the sync engine only assumes "fetch all ordered by creation
/// time descending" plus row-level insert/update/delete.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Bulk read of all incidents, `created_at` descending. Used for
    /// bootstrap and for resync after a feed disruption.
    async fn fetch_all(&self) -> anyhow::Result<Vec<Incident>>;

    /// Insert a new incident; the remote system assigns `id` and
    /// `created_at` and returns the authoritative record.
    async fn insert_incident(&self, draft: &IncidentDraft) -> anyhow::Result<Incident>;

    /// Partial update of a single row. Each present field fully replaces
    /// the stored value.
    async fn update_incident(&self, id: &str, patch: &IncidentPatch) -> anyhow::Result<()>;

    async fn delete_incident(&self, id: &str) -> anyhow::Result<()>;
}

/// REST implementation against the backend-as-a-service row API
pub struct RestBackend {
    base_url: String,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    async fn fetch_all(&self) -> anyhow::Result<Vec<Incident>> {
        let resp = self
            .client
            .get(self.url("/incidents"))
            .query(&[("order", "created_at.desc")])
            .send()
            .await
            .context("bulk incident fetch failed")?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn insert_incident(&self, draft: &IncidentDraft) -> anyhow::Result<Incident> {
        let resp = self
            .client
            .post(self.url("/incidents"))
            .json(draft)
            .send()
            .await
            .context("incident insert failed")?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn update_incident(&self, id: &str, patch: &IncidentPatch) -> anyhow::Result<()> {
        self.client
            .patch(self.url(&format!("/incidents/{}", id)))
            .json(patch)
            .send()
            .await
            .context("incident update failed")?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_incident(&self, id: &str) -> anyhow::Result<()> {
        self.client
            .delete(self.url(&format!("/incidents/{}", id)))
            .send()
            .await
            .context("incident delete failed")?
            .error_for_status()?;
        Ok(())
    }
}
