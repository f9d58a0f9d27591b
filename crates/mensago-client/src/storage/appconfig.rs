//! Application settings stored alongside profile data

use sea_orm::sea_query::OnConflict;
use sea_orm::*;

use super::Storage;
use super::entity::appconfig;
use crate::error::{ClientError, Result};

const TYPE_INT: &str = "int";
const TYPE_STR: &str = "str";

impl Storage {
    pub async fn get_int(&self, name: &str) -> Result<Option<i64>> {
        match self.get_value(name, TYPE_INT).await? {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ClientError::bad_value(format!("setting {} is not an integer", name))),
            None => Ok(None),
        }
    }

    pub async fn set_int(&self, name: &str, value: i64) -> Result<()> {
        self.set_value(name, TYPE_INT, &value.to_string()).await
    }

    pub async fn get_str(&self, name: &str) -> Result<Option<String>> {
        self.get_value(name, TYPE_STR).await
    }

    pub async fn set_str(&self, name: &str, value: &str) -> Result<()> {
        self.set_value(name, TYPE_STR, value).await
    }

    async fn get_value(&self, name: &str, ftype: &str) -> Result<Option<String>> {
        let value = appconfig::Entity::find_by_id((name.to_string(), ftype.to_string()))
            .one(self.db())
            .await?
            .map(|m| m.fvalue);
        Ok(value)
    }

    async fn set_value(&self, name: &str, ftype: &str, value: &str) -> Result<()> {
        let entity = appconfig::ActiveModel {
            fname: Set(name.to_string()),
            ftype: Set(ftype.to_string()),
            fvalue: Set(value.to_string()),
        };
        appconfig::Entity::insert(entity)
            .on_conflict(
                OnConflict::columns([appconfig::Column::Fname, appconfig::Column::Ftype])
                    .update_column(appconfig::Column::Fvalue)
                    .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }
}
