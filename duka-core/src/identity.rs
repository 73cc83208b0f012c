use async_trait::async_trait;
use duka_shared::Masked;
use serde::{Deserialize, Serialize};

/// The slice of a user account the back office needs to reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContact {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<Masked<String>>,
}

/// Read-only view onto the user accounts owned by the auth collaborator.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn find_contact(
        &self,
        user_id: i64,
    ) -> Result<Option<UserContact>, Box<dyn std::error::Error + Send + Sync>>;
}
