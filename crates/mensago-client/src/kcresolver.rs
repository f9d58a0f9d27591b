//! Keycard resolution with caching
//!
//! Cards are looked up in memory first, then in the profile database, and
//! finally fetched from the owner's server. Every card taken from a server
//! is verified before it is cached.

use chrono::{Duration, Utc};
use moka::future::Cache;
use tracing::{debug, info};

use mensago_common::{CryptoString, Domain, IdType, MAddress, RandomId};
use mensago_core::Keycard;

use crate::commands;
use crate::conn::ServerConnection;
use crate::error::{ClientError, Result};
use crate::settings::ClientSettings;
use crate::storage::{Storage, card_ttl};

/// Keys an organization publishes in its current keycard entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtRecord {
    /// Primary verification key
    pub pvk: CryptoString,
    /// Secondary verification key
    pub svk: Option<CryptoString>,
    /// Encryption key
    pub ek: CryptoString,
}

#[derive(Debug, Clone)]
struct CachedCard {
    card: Keycard,
    /// Unix time after which the card must be refreshed
    expires: i64,
}

/// Who a keycard belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
enum CardOwner {
    Organization(Domain),
    User(MAddress),
}

impl CardOwner {
    fn parse(owner: &str) -> Result<Self> {
        let owner = owner.trim();
        if !owner.contains('/') && Domain::is_valid(owner) {
            return Ok(CardOwner::Organization(owner.parse()?));
        }
        Ok(CardOwner::User(owner.parse()?))
    }

    fn domain(&self) -> &Domain {
        match self {
            CardOwner::Organization(domain) => domain,
            CardOwner::User(addr) => &addr.domain,
        }
    }

    fn key(&self) -> String {
        match self {
            CardOwner::Organization(domain) => domain.to_string(),
            CardOwner::User(addr) => addr.to_string(),
        }
    }
}

pub struct KCResolver {
    settings: ClientSettings,
    storage: Option<Storage>,
    cache: Cache<String, CachedCard>,
}

impl KCResolver {
    pub fn new(settings: ClientSettings, storage: Option<Storage>) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.keycard_cache_size())
            .build();
        Self {
            settings,
            storage,
            cache,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Switches the database used as the second cache level
    pub fn set_storage(&mut self, storage: Option<Storage>) {
        self.storage = storage;
    }

    /// Returns the keycard for a domain (organization card) or an address
    /// (user card)
    pub async fn get_card(&self, owner: &str) -> Result<Keycard> {
        let owner = CardOwner::parse(owner)?;
        let key = owner.key();
        let now = Utc::now().timestamp();

        if let Some(cached) = self.cache.get(&key).await {
            if cached.expires > now {
                debug!(owner = %key, "keycard found in memory cache");
                return Ok(cached.card);
            }
            self.cache.invalidate(&key).await;
        }

        let mut stale = false;
        if let Some(storage) = &self.storage {
            match storage.get_card(&key).await? {
                Some((card, false)) => {
                    debug!(owner = %key, "keycard found in database");
                    self.remember(&key, &card).await;
                    return Ok(card);
                }
                Some((_, true)) => stale = true,
                None => {}
            }
        }

        let card = self.fetch_card(&owner).await?;
        card.verify()?;

        if let Some(storage) = &self.storage {
            if stale {
                storage.update_card(&key, &card).await?;
            } else {
                storage.add_card(&key, &card, card_ttl(&card)).await?;
            }
        }
        self.remember(&key, &card).await;

        info!(owner = %key, entries = card.len(), "resolved keycard");
        Ok(card)
    }

    async fn remember(&self, key: &str, card: &Keycard) {
        let expires = (Utc::now() + Duration::days(i64::from(card_ttl(card)))).timestamp();
        self.cache
            .insert(
                key.to_string(),
                CachedCard {
                    card: card.clone(),
                    expires,
                },
            )
            .await;
    }

    async fn connect(&self, domain: &Domain) -> Result<ServerConnection> {
        let (host, port) = self.settings.server_for(domain)?;
        let mut conn = ServerConnection::with_timeouts(
            self.settings.connect_timeout(),
            self.settings.read_timeout(),
        );
        conn.connect(&host, port).await?;
        Ok(conn)
    }

    async fn fetch_card(&self, owner: &CardOwner) -> Result<Keycard> {
        let mut conn = self.connect(owner.domain()).await?;
        let result = match owner {
            CardOwner::Organization(_) => commands::orgcard(&mut conn, 1, None).await,
            CardOwner::User(addr) => commands::usercard(&mut conn, addr, 1, None).await,
        };
        conn.disconnect().await?;
        result
    }

    /// Returns the workspace ID for an address, asking the address's
    /// server when the address uses a user ID
    pub async fn resolve_address(&self, addr: &MAddress) -> Result<RandomId> {
        if addr.id_type() == IdType::Workspace {
            return Ok(addr.id.as_str().parse()?);
        }

        let mut conn = self.connect(&addr.domain).await?;
        let result = commands::getwid(&mut conn, &addr.id, Some(&addr.domain)).await;
        conn.disconnect().await?;
        result
    }

    /// Returns the organization keys for a domain from its current keycard
    /// entry
    pub async fn get_mgmt_record(&self, domain: &Domain) -> Result<MgmtRecord> {
        let card = self.get_card(domain.as_str()).await?;
        let entry = card
            .current()
            .ok_or_else(|| ClientError::not_found(format!("keycard for {}", domain)))?;

        let field = |name: &str| -> Result<CryptoString> {
            entry
                .field(name)
                .ok_or_else(|| ClientError::not_found(format!("{} in keycard for {}", name, domain)))?
                .parse()
                .map_err(ClientError::from)
        };

        Ok(MgmtRecord {
            pvk: field("Primary-Verification-Key")?,
            svk: entry
                .field("Secondary-Verification-Key")
                .filter(|k| !k.is_empty())
                .map(str::parse::<CryptoString>)
                .transpose()?,
            ek: field("Encryption-Key")?,
        })
    }
}
