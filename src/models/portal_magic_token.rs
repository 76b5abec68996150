//! Portal magic-link token entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "portal_magic_tokens")]
pub struct Model {
    /// Random link identifier; doubles as the bearer value in the emailed link
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub client_id: String,
    pub tenant_id: String,
    pub email: String,
    pub expires_at: DateTimeWithTimeZone,
    pub used: bool,
    pub used_at: Option<DateTimeWithTimeZone>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
