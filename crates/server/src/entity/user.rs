//! User entity - local accounts and their credentials.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// UUIDv7, string encoded
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: Option<String>,
    /// Encoded Argon2id hash. `None` for anonymous accounts.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub display_name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_server::Entity")]
    Servers,
}

impl Related<super::user_server::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Servers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_anonymous(&self) -> bool {
        self.password_hash.is_none()
    }
}
