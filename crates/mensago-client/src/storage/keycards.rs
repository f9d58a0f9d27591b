//! Local keycard cache

use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::debug;

use mensago_core::{Entry, EntryType, Keycard};

use super::Storage;
use super::entity::keycards;
use super::keys::{KeyCategory, StoredKey, insert_key};
use crate::error::{ClientError, Result};

/// TTL of a card in days, taken from its current entry
pub fn card_ttl(card: &Keycard) -> u32 {
    card.current()
        .and_then(|e| e.field("Time-To-Live"))
        .and_then(|ttl| ttl.parse().ok())
        .unwrap_or_else(|| card.entry_type().default_ttl())
}

fn entry_model(owner: &str, entry: &Entry, ttl_expires: i64) -> Result<keycards::ActiveModel> {
    let index = i32::try_from(entry.index()?)
        .map_err(|_| ClientError::bad_value("keycard entry index out of range"))?;
    let text = String::from_utf8(entry.to_bytes())
        .map_err(|_| ClientError::bad_value("keycard entry is not valid UTF-8"))?;

    Ok(keycards::ActiveModel {
        owner: Set(owner.to_string()),
        entry_index: Set(index),
        entry_type: Set(entry.entry_type().as_str().to_string()),
        entry: Set(text),
        hash: Set(entry.hash().to_string()),
        expires: Set(entry.field("Expires").unwrap_or_default().to_string()),
        ttl_expires: Set(ttl_expires),
        id: NotSet,
    })
}

/// Unix time `days` days from now
fn ttl_deadline(days: u32) -> i64 {
    (Utc::now() + Duration::days(i64::from(days))).timestamp()
}

fn model_entry(model: &keycards::Model) -> Result<Entry> {
    let entry_type: EntryType = model.entry_type.parse()?;
    Ok(Entry::from_bytes(entry_type, model.entry.as_bytes())?)
}

async fn replace_card<C: ConnectionTrait>(
    conn: &C,
    owner: &str,
    card: &Keycard,
    deadline: i64,
) -> Result<()> {
    keycards::Entity::delete_many()
        .filter(keycards::Column::Owner.eq(owner))
        .exec(conn)
        .await?;
    for entry in &card.entries {
        entry_model(owner, entry, deadline)?.insert(conn).await?;
    }
    Ok(())
}

impl Storage {
    /// Caches a keycard, replacing anything stored for the owner
    pub async fn add_card(&self, owner: &str, card: &Keycard, ttl_days: u32) -> Result<()> {
        let txn = self.db().begin().await?;
        replace_card(&txn, owner, card, ttl_deadline(ttl_days)).await?;
        txn.commit().await?;
        debug!(owner, entries = card.len(), ttl_days, "cached keycard");
        Ok(())
    }

    /// Caches the owner's card together with the keys behind its newest
    /// entry. Either both are stored or neither is.
    pub async fn add_card_with_keys(
        &self,
        owner: &str,
        card: &Keycard,
        ttl_days: u32,
        keys: &[(StoredKey, KeyCategory)],
    ) -> Result<()> {
        let txn = self.db().begin().await?;
        for (key, category) in keys {
            insert_key(&txn, key, owner, *category).await?;
        }
        replace_card(&txn, owner, card, ttl_deadline(ttl_days)).await?;
        txn.commit().await?;
        debug!(owner, entries = card.len(), keys = keys.len(), "cached keycard and keys");
        Ok(())
    }

    /// Appends entries newer than the last cached one and refreshes the
    /// owner's TTL. Keycards are append-only, so older entries never change.
    pub async fn update_card(&self, owner: &str, card: &Keycard) -> Result<()> {
        let ttl_days = card_ttl(card);
        let last_index = match self.get_last_entry(owner).await? {
            Some(entry) => entry.index()?,
            None => return self.add_card(owner, card, ttl_days).await,
        };

        let deadline = ttl_deadline(ttl_days);
        let txn = self.db().begin().await?;
        let mut added = 0;
        for entry in &card.entries {
            if entry.index()? > last_index {
                entry_model(owner, entry, deadline)?.insert(&txn).await?;
                added += 1;
            }
        }

        keycards::Entity::update_many()
            .col_expr(keycards::Column::TtlExpires, Expr::value(deadline))
            .filter(keycards::Column::Owner.eq(owner))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        debug!(owner, added, "updated cached keycard");
        Ok(())
    }

    /// Returns the cached card for an owner and whether its TTL has passed
    pub async fn get_card(&self, owner: &str) -> Result<Option<(Keycard, bool)>> {
        let rows = keycards::Entity::find()
            .filter(keycards::Column::Owner.eq(owner))
            .order_by_asc(keycards::Column::EntryIndex)
            .all(self.db())
            .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let mut card = Keycard::new(first.entry_type.parse()?);
        let now = Utc::now().timestamp();
        let mut expired = false;
        for row in &rows {
            card.push(model_entry(row)?)?;
            expired |= row.ttl_expires <= now;
        }
        Ok(Some((card, expired)))
    }

    /// Returns the newest cached entry for an owner
    pub async fn get_last_entry(&self, owner: &str) -> Result<Option<Entry>> {
        let row = keycards::Entity::find()
            .filter(keycards::Column::Owner.eq(owner))
            .order_by_desc(keycards::Column::EntryIndex)
            .one(self.db())
            .await?;
        row.as_ref().map(model_entry).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mensago_common::HashAlgorithm;
    use mensago_core::{EncryptionPair, SigType, SigningPair};

    const OWNER: &str = "example.com";

    fn org_card() -> (Keycard, SigningPair) {
        let sign = SigningPair::generate();
        let encrypt = EncryptionPair::generate();
        let mut entry = Entry::new_org();
        entry.set_fields([
            ("Name", "Example, Inc."),
            ("Contact-Admin", "c590b44c-798d-4055-8d72-725a7942f3f6/example.com"),
            ("Primary-Verification-Key", sign.public_key().as_str()),
            ("Encryption-Key", encrypt.public_key().as_str()),
        ]);
        entry.generate_hash(HashAlgorithm::Blake2b256);
        entry.sign(sign.private_key(), SigType::Organization).unwrap();
        (Keycard::with_root(entry), sign)
    }

    async fn open() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("storage.db")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_add_and_get_card() {
        let (_dir, storage) = open().await;
        let (mut card, sign) = org_card();
        card.chain(sign.private_key(), false).unwrap();

        assert!(storage.get_card(OWNER).await.unwrap().is_none());
        storage.add_card(OWNER, &card, 30).await.unwrap();

        let (loaded, expired) = storage.get_card(OWNER).await.unwrap().unwrap();
        assert!(!expired);
        assert_eq!(loaded, card);
        loaded.verify().unwrap();

        let last = storage.get_last_entry(OWNER).await.unwrap().unwrap();
        assert_eq!(last.index().unwrap(), 2);

        // Adding again replaces rather than duplicates
        storage.add_card(OWNER, &card, 30).await.unwrap();
        let (loaded, _) = storage.get_card(OWNER).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_ttl() {
        let (_dir, storage) = open().await;
        let (card, _) = org_card();
        storage.add_card(OWNER, &card, 0).await.unwrap();

        let (_, expired) = storage.get_card(OWNER).await.unwrap().unwrap();
        assert!(expired);
    }

    #[tokio::test]
    async fn test_update_card() {
        let (_dir, storage) = open().await;
        let (mut card, sign) = org_card();
        storage.add_card(OWNER, &card, 0).await.unwrap();

        let chained = card.chain(sign.private_key(), true).unwrap();
        let next_key = chained.keys.signing_pair().private_key().clone();
        card.chain(&next_key, false).unwrap();

        storage.update_card(OWNER, &card).await.unwrap();
        let (loaded, expired) = storage.get_card(OWNER).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(!expired);
        loaded.verify().unwrap();

        // Nothing new to add
        storage.update_card(OWNER, &card).await.unwrap();
        let (loaded, _) = storage.get_card(OWNER).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[tokio::test]
    async fn test_update_uncached_card() {
        let (_dir, storage) = open().await;
        let (card, _) = org_card();
        storage.update_card(OWNER, &card).await.unwrap();
        assert_eq!(storage.get_card(OWNER).await.unwrap().unwrap().0.len(), 1);
        assert_eq!(card_ttl(&card), 30);
    }

    #[tokio::test]
    async fn test_add_card_with_keys() {
        let (_dir, storage) = open().await;
        let (card, _) = org_card();
        let sign = SigningPair::generate();
        let keys = [(StoredKey::from(sign.clone()), KeyCategory::Sign)];

        storage.add_card_with_keys(OWNER, &card, 30, &keys).await.unwrap();
        assert_eq!(storage.get_card(OWNER).await.unwrap().unwrap().0, card);
        let stored = storage.get_key_by_category(KeyCategory::Sign).await.unwrap();
        assert_eq!(stored.into_signing_pair().unwrap(), sign);
    }

    #[tokio::test]
    async fn test_add_card_with_keys_rolls_back() {
        let (_dir, storage) = open().await;
        let (card, _) = org_card();
        let encrypt = EncryptionPair::generate();
        let sign = SigningPair::generate();
        storage
            .add_key(&sign.clone().into(), OWNER, KeyCategory::Sign)
            .await
            .unwrap();

        // The second key already exists, so nothing from this call is kept
        let keys = [
            (StoredKey::from(encrypt), KeyCategory::Encrypt),
            (StoredKey::from(sign), KeyCategory::Sign),
        ];
        assert!(storage.add_card_with_keys(OWNER, &card, 30, &keys).await.is_err());
        assert!(storage.get_card(OWNER).await.unwrap().is_none());
        assert!(
            storage
                .get_key_by_category(KeyCategory::Encrypt)
                .await
                .is_err()
        );
    }
}
