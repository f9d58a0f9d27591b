//! `SeaORM` Entity for userinfo table

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "userinfo")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub fieldname: String,
    pub fieldvalue: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
