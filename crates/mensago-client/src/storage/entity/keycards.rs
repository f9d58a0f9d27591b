//! `SeaORM` Entity for keycards table

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "keycards")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner: String,
    pub entry_index: i32,
    pub entry_type: String,
    #[sea_orm(column_type = "Text")]
    pub entry: String,
    pub hash: String,
    pub expires: String,
    /// Unix time after which the cached card must be refreshed
    pub ttl_expires: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
