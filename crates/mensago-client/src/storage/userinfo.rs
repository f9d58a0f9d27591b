//! The user's own contact information
//!
//! Fields are stored by dot-separated name. A list field `Nicknames` is kept
//! as one row per item, `Nicknames.0`, `Nicknames.1`, and so on.

use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tracing::debug;

use super::Storage;
use super::entity::userinfo;
use crate::error::{ClientError, Result};

/// Field name that selects every stored field in `load_user_fields`
pub const ALL_FIELDS: &str = "*";

pub const GIVEN_NAME: &str = "GivenName";
pub const FAMILY_NAME: &str = "FamilyName";
pub const PREFIX: &str = "Prefix";
pub const FORMATTED_NAME: &str = "FormattedName";
pub const SUFFIXES: &str = "Suffixes";
pub const ADDITIONAL_NAMES: &str = "AdditionalNames";

/// A person's name, split into the parts a contact card keeps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name {
    pub given: String,
    pub family: String,
    pub prefix: String,
    pub suffixes: Vec<String>,
    pub additional: Vec<String>,
    pub family_first: bool,
}

impl Name {
    pub fn new(given: &str, family: &str) -> Self {
        Self {
            given: given.to_string(),
            family: family.to_string(),
            ..Default::default()
        }
    }

    /// The display form, e.g. `Dr. Corbin Alan Simons, PhD`
    pub fn formatted(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let given = Some(self.given.as_str()).filter(|s| !s.is_empty());
        let family = Some(self.family.as_str()).filter(|s| !s.is_empty());
        let additional = self.additional.iter().map(String::as_str);

        if self.family_first {
            parts.extend(family);
            parts.extend(given);
            parts.extend(additional);
        } else {
            parts.extend(given);
            parts.extend(additional);
            parts.extend(family);
        }

        let base = parts.join(" ");
        if base.is_empty() {
            return base;
        }

        let mut out = String::new();
        if !self.prefix.is_empty() {
            out.push_str(&self.prefix);
            out.push(' ');
        }
        out.push_str(&base);
        if !self.suffixes.is_empty() {
            out.push_str(", ");
            out.push_str(&self.suffixes.join(", "));
        }
        out
    }
}

fn check_name(fieldname: &str) -> Result<()> {
    if fieldname.is_empty() {
        return Err(ClientError::bad_value("empty user field name"));
    }
    Ok(())
}

fn list_prefix(fieldname: &str) -> String {
    format!("{}.", fieldname)
}

async fn put_field<C: ConnectionTrait>(conn: &C, fieldname: &str, value: &str) -> Result<()> {
    let entity = userinfo::ActiveModel {
        fieldname: Set(fieldname.to_string()),
        fieldvalue: Set(value.to_string()),
    };
    userinfo::Entity::insert(entity)
        .on_conflict(
            OnConflict::column(userinfo::Column::Fieldname)
                .update_column(userinfo::Column::Fieldvalue)
                .to_owned(),
        )
        .exec(conn)
        .await?;
    Ok(())
}

async fn remove_field<C: ConnectionTrait>(conn: &C, fieldname: &str) -> Result<()> {
    userinfo::Entity::delete_by_id(fieldname).exec(conn).await?;
    Ok(())
}

async fn remove_list<C: ConnectionTrait>(conn: &C, fieldname: &str) -> Result<()> {
    userinfo::Entity::delete_many()
        .filter(userinfo::Column::Fieldname.starts_with(list_prefix(fieldname)))
        .exec(conn)
        .await?;
    Ok(())
}

async fn put_list<C: ConnectionTrait>(conn: &C, fieldname: &str, values: &[String]) -> Result<()> {
    remove_list(conn, fieldname).await?;
    for (i, value) in values.iter().enumerate() {
        put_field(conn, &format!("{}.{}", fieldname, i), value).await?;
    }
    Ok(())
}

impl Storage {
    /// Loads a single field. Empty values count as missing.
    pub async fn load_user_field(&self, fieldname: &str) -> Result<String> {
        check_name(fieldname)?;
        userinfo::Entity::find_by_id(fieldname)
            .one(self.db())
            .await?
            .map(|m| m.fieldvalue)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ClientError::not_found(format!("user field {}", fieldname)))
    }

    /// Loads name/value pairs: every stored field for `*`, otherwise just
    /// the named one
    pub async fn load_user_fields(&self, fieldname: &str) -> Result<Vec<(String, String)>> {
        if fieldname != ALL_FIELDS {
            let value = self.load_user_field(fieldname).await?;
            return Ok(vec![(fieldname.to_string(), value)]);
        }

        let rows = userinfo::Entity::find()
            .order_by_asc(userinfo::Column::Fieldname)
            .all(self.db())
            .await?;
        if rows.is_empty() {
            return Err(ClientError::not_found("user fields"));
        }
        Ok(rows
            .into_iter()
            .map(|m| (m.fieldname, m.fieldvalue))
            .collect())
    }

    pub async fn save_user_field(&self, fieldname: &str, value: &str) -> Result<()> {
        check_name(fieldname)?;
        put_field(self.db(), fieldname, value).await
    }

    pub async fn delete_user_field(&self, fieldname: &str) -> Result<()> {
        check_name(fieldname)?;
        remove_field(self.db(), fieldname).await
    }

    /// Loads a list field in item order
    pub async fn load_user_list_field(&self, fieldname: &str) -> Result<Vec<String>> {
        check_name(fieldname)?;
        let prefix = list_prefix(fieldname);
        let rows = userinfo::Entity::find()
            .filter(userinfo::Column::Fieldname.starts_with(prefix.as_str()))
            .all(self.db())
            .await?;

        let mut items: Vec<(usize, String)> = rows
            .into_iter()
            .filter_map(|m| {
                let index = m.fieldname.strip_prefix(&prefix)?.parse().ok()?;
                Some((index, m.fieldvalue))
            })
            .collect();
        if items.is_empty() {
            return Err(ClientError::not_found(format!("user field {}", fieldname)));
        }
        items.sort_by_key(|(index, _)| *index);
        Ok(items.into_iter().map(|(_, value)| value).collect())
    }

    /// Replaces a list field. An empty list removes it.
    pub async fn save_user_list_field(&self, fieldname: &str, values: &[String]) -> Result<()> {
        check_name(fieldname)?;
        let txn = self.db().begin().await?;
        put_list(&txn, fieldname, values).await?;
        txn.commit().await?;
        Ok(())
    }

    pub async fn delete_user_list_field(&self, fieldname: &str) -> Result<()> {
        check_name(fieldname)?;
        remove_list(self.db(), fieldname).await
    }

    /// Stores every part of a name, removing parts the name leaves empty
    pub async fn save_name(&self, name: &Name) -> Result<()> {
        let formatted = name.formatted();
        let single = [
            (GIVEN_NAME, name.given.as_str()),
            (FAMILY_NAME, name.family.as_str()),
            (PREFIX, name.prefix.as_str()),
            (FORMATTED_NAME, formatted.as_str()),
        ];

        let txn = self.db().begin().await?;
        for (fieldname, value) in single {
            if value.is_empty() {
                remove_field(&txn, fieldname).await?;
            } else {
                put_field(&txn, fieldname, value).await?;
            }
        }
        put_list(&txn, SUFFIXES, &name.suffixes).await?;
        put_list(&txn, ADDITIONAL_NAMES, &name.additional).await?;
        txn.commit().await?;

        debug!(name = %formatted, "saved user name");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mensago_common::MensagoError;

    async fn open() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("storage.db")).await.unwrap();
        (dir, storage)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| ToString::to_string(s)).collect()
    }

    #[test]
    fn test_formatted_name() {
        assert_eq!(Name::new("Corbin", "Simons").formatted(), "Corbin Simons");
        assert_eq!(Name::default().formatted(), "");

        let name = Name {
            given: "Corbin".to_string(),
            family: "Simons".to_string(),
            prefix: "Dr.".to_string(),
            suffixes: strings(&["MD", "PhD"]),
            additional: strings(&["Alan"]),
            family_first: false,
        };
        assert_eq!(name.formatted(), "Dr. Corbin Alan Simons, MD, PhD");

        let name = Name {
            family_first: true,
            ..Name::new("Lin", "Mei")
        };
        assert_eq!(name.formatted(), "Mei Lin");

        // A prefix alone does not make a name
        let name = Name {
            prefix: "Mr.".to_string(),
            ..Default::default()
        };
        assert_eq!(name.formatted(), "");
    }

    #[tokio::test]
    async fn test_single_fields() {
        let (_dir, storage) = open().await;

        assert!(matches!(
            storage.load_user_field("Email").await,
            Err(ClientError::Mensago(MensagoError::NotFound(_)))
        ));
        assert!(storage.save_user_field("", "x").await.is_err());

        storage.save_user_field("Email", "corbin@example.com").await.unwrap();
        storage.save_user_field("Email", "csimons@example.com").await.unwrap();
        assert_eq!(
            storage.load_user_field("Email").await.unwrap(),
            "csimons@example.com"
        );

        storage.save_user_field("Phone.Mobile", "555-0100").await.unwrap();
        let all = storage.load_user_fields(ALL_FIELDS).await.unwrap();
        assert_eq!(
            all,
            vec![
                ("Email".to_string(), "csimons@example.com".to_string()),
                ("Phone.Mobile".to_string(), "555-0100".to_string()),
            ]
        );
        assert_eq!(storage.load_user_fields("Phone.Mobile").await.unwrap().len(), 1);

        storage.delete_user_field("Email").await.unwrap();
        assert!(storage.load_user_field("Email").await.is_err());

        // Empty values read as missing
        storage.save_user_field("Title", "").await.unwrap();
        assert!(storage.load_user_field("Title").await.is_err());
    }

    #[tokio::test]
    async fn test_no_fields() {
        let (_dir, storage) = open().await;
        assert!(matches!(
            storage.load_user_fields(ALL_FIELDS).await,
            Err(ClientError::Mensago(MensagoError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_list_fields() {
        let (_dir, storage) = open().await;
        let nicknames: Vec<String> = (0..12).map(|i| format!("nickname{}", i)).collect();

        storage.save_user_list_field("Nicknames", &nicknames).await.unwrap();
        storage.save_user_field("NicknamesNote", "unrelated").await.unwrap();
        assert_eq!(
            storage.load_user_list_field("Nicknames").await.unwrap(),
            nicknames
        );
        assert_eq!(
            storage.load_user_field("Nicknames.10").await.unwrap(),
            "nickname10"
        );

        // Saving a shorter list drops the old items
        let short = strings(&["corb"]);
        storage.save_user_list_field("Nicknames", &short).await.unwrap();
        assert_eq!(storage.load_user_list_field("Nicknames").await.unwrap(), short);
        assert!(storage.load_user_field("Nicknames.1").await.is_err());

        storage.delete_user_list_field("Nicknames").await.unwrap();
        assert!(storage.load_user_list_field("Nicknames").await.is_err());
        assert_eq!(
            storage.load_user_field("NicknamesNote").await.unwrap(),
            "unrelated"
        );
    }

    #[tokio::test]
    async fn test_save_name_syncs_fields() {
        let (_dir, storage) = open().await;
        let name = Name {
            prefix: "Dr.".to_string(),
            suffixes: strings(&["PhD"]),
            additional: strings(&["Alan", "James"]),
            ..Name::new("Corbin", "Simons")
        };
        storage.save_name(&name).await.unwrap();

        assert_eq!(
            storage.load_user_field(FORMATTED_NAME).await.unwrap(),
            "Dr. Corbin Alan James Simons, PhD"
        );
        assert_eq!(storage.load_user_field(PREFIX).await.unwrap(), "Dr.");
        assert_eq!(
            storage.load_user_list_field(ADDITIONAL_NAMES).await.unwrap(),
            strings(&["Alan", "James"])
        );

        // Parts missing from the new name are removed
        storage.save_name(&Name::new("Corbin", "Simons")).await.unwrap();
        assert_eq!(
            storage.load_user_field(FORMATTED_NAME).await.unwrap(),
            "Corbin Simons"
        );
        assert!(storage.load_user_field(PREFIX).await.is_err());
        assert!(storage.load_user_list_field(SUFFIXES).await.is_err());
        assert!(storage.load_user_list_field(ADDITIONAL_NAMES).await.is_err());
        assert_eq!(storage.load_user_field(GIVEN_NAME).await.unwrap(), "Corbin");
    }
}
