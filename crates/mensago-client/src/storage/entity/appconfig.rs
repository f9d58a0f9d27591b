//! `SeaORM` Entity for appconfig table

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "appconfig")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub fname: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub ftype: String,
    pub fvalue: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
