//! MensagoClient tests
//!
//! These run full account flows against the in-memory mensagod: the client
//! registers, sets up its local workspace, logs in, and uploads keycard
//! entries.

mod common;

use mensago_client::storage::{FORMATTED_NAME, KeyCategory};
use mensago_client::{ClientError, MensagoClient, Name};
use mensago_common::{Domain, MAddress, MensagoError, UserId};

use common::{FakeMensagod, TEST_DOMAIN, TEST_PASSWORD};

async fn new_client(server: &FakeMensagod, dir: &tempfile::TempDir) -> MensagoClient {
    MensagoClient::with_settings(Some(dir.path().to_path_buf()), server.settings())
        .await
        .expect("Failed to create client")
}

async fn register(client: &mut MensagoClient) -> anyhow::Result<mensago_client::commands::RegistrationInfo> {
    let domain: Domain = TEST_DOMAIN.parse()?;
    let uid: UserId = "csimons".parse()?;
    Ok(client
        .register_account(
            &domain,
            TEST_PASSWORD,
            Some(&uid),
            Some(&Name::new("Corbin", "Simons")),
        )
        .await?)
}

// ============== Registration ==============

#[tokio::test]
async fn test_register_account() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    let info = register(&mut client).await?;
    assert_eq!(info.domain.as_str(), TEST_DOMAIN);
    assert_eq!(info.uid.as_ref().map(|u| u.as_str()), Some("csimons"));
    assert!(!client.is_connected());

    // The profile now carries the identity
    let profile = client.profiles().active_profile()?;
    assert_eq!(profile.wid(), Some(&info.wid));
    assert_eq!(profile.domain().map(Domain::as_str), Some(TEST_DOMAIN));
    assert_eq!(profile.uid().map(UserId::as_str), Some("csimons"));

    // The root keycard entry was signed by the organization and stored on
    // both sides
    let entries = server.user_entries(info.wid.as_str());
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.field("User-ID"), Some("csimons"));
    assert_eq!(entry.field("Name"), Some("Corbin Simons"));
    entry.is_compliant()?;

    let storage = profile.storage()?;
    let owner = format!("{}/{}", info.wid, TEST_DOMAIN);
    let (card, expired) = storage.get_card(&owner).await?.unwrap();
    assert!(!expired);
    assert_eq!(card.len(), 1);
    assert_eq!(card.current().unwrap().hash(), entry.hash());

    // The organization card was cached while the entry was verified
    assert!(storage.get_card(TEST_DOMAIN).await?.is_some());

    assert_eq!(storage.load_user_field(FORMATTED_NAME).await?, "Corbin Simons");
    assert_eq!(storage.load_user_field("FamilyName").await?, "Simons");
    Ok(())
}

#[tokio::test]
async fn test_register_twice_fails() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    register(&mut client).await?;
    let result = register(&mut client).await;
    assert!(result.is_err());

    let domain: Domain = TEST_DOMAIN.parse()?;
    assert!(matches!(
        client.register_account(&domain, TEST_PASSWORD, None, None).await,
        Err(ClientError::Mensago(MensagoError::Exists(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_register_weak_password() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    let domain: Domain = TEST_DOMAIN.parse()?;
    let result = client.register_account(&domain, "password", None, None).await;
    assert!(result.is_err());
    // Nothing was sent
    assert!(server.server.actions().is_empty());
    Ok(())
}

// ============== Sessions ==============

#[tokio::test]
async fn test_login_after_register() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;
    register(&mut client).await?;

    let address: MAddress = format!("csimons/{}", TEST_DOMAIN).parse()?;
    client.login(&address).await?;
    assert!(client.is_logged_in());
    assert!(!client.is_admin());

    assert!(matches!(
        client.preregister_account(None, None).await,
        Err(ClientError::NotAdmin)
    ));

    client.logout().await?;
    assert!(!client.is_logged_in());
    client.disconnect().await?;
    assert!(!client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_preregister_requires_login() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    assert!(matches!(
        client.preregister_account(None, None).await,
        Err(ClientError::NotLoggedIn)
    ));
    Ok(())
}

#[tokio::test]
async fn test_login_unknown_user() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    let address: MAddress = format!("nobody/{}", TEST_DOMAIN).parse()?;
    assert!(client.login(&address).await.is_err());
    assert!(!client.is_logged_in());
    Ok(())
}

// ============== Keycards ==============

#[tokio::test]
async fn test_update_keycard_chains_entry() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;
    let info = register(&mut client).await?;

    client.update_keycard().await?;

    let entries = server.user_entries(info.wid.as_str());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].index()?, 2);
    assert_eq!(entries[1].prev_hash(), entries[0].hash());
    assert_ne!(
        entries[1].field("Verification-Key"),
        entries[0].field("Verification-Key")
    );

    let storage = client.profiles().active_profile()?.storage()?;
    let owner = format!("{}/{}", info.wid, TEST_DOMAIN);
    let (card, _) = storage.get_card(&owner).await?.unwrap();
    assert_eq!(card.len(), 2);
    card.verify()?;
    Ok(())
}

#[tokio::test]
async fn test_update_keycard_rejected_keeps_keys() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;
    let info = register(&mut client).await?;

    server.set_reject_entries(true);
    assert_eq!(client.update_keycard().await.unwrap_err().server_code(), Some(503));
    assert_eq!(server.user_entries(info.wid.as_str()).len(), 1);

    // The stored keys still belong to the published entry
    let storage = client.profiles().active_profile()?.storage()?.clone();
    let owner = format!("{}/{}", info.wid, TEST_DOMAIN);
    let (card, _) = storage.get_card(&owner).await?.unwrap();
    assert_eq!(card.len(), 1);
    let current = card.current().unwrap();
    let sign = storage
        .get_key_by_category(KeyCategory::Sign)
        .await?
        .into_signing_pair()?;
    let crsign = storage
        .get_key_by_category(KeyCategory::CrSign)
        .await?
        .into_signing_pair()?;
    assert_eq!(current.field("Verification-Key"), Some(sign.public_key().as_str()));
    assert_eq!(
        current.field("Contact-Request-Verification-Key"),
        Some(crsign.public_key().as_str())
    );

    // A later update still chains from the published entry
    server.set_reject_entries(false);
    client.update_keycard().await?;
    let (card, _) = storage.get_card(&owner).await?.unwrap();
    assert_eq!(card.len(), 2);
    card.verify()?;
    let sign = storage
        .get_key_by_category(KeyCategory::Sign)
        .await?
        .into_signing_pair()?;
    assert_eq!(
        card.current().unwrap().field("Verification-Key"),
        Some(sign.public_key().as_str())
    );
    Ok(())
}

#[tokio::test]
async fn test_redeem_regcode() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let wid = "a7e6c2f5-3c8e-4d2c-9f0b-0f8c2b4a6d11";
    server.add_regcode("Seven Brave Otters Carry Lanterns", wid, Some("rbrannan"));

    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    let address: MAddress = format!("rbrannan/{}", TEST_DOMAIN).parse()?;
    let info = client
        .redeem_regcode(&address, "Seven Brave Otters Carry Lanterns", TEST_PASSWORD)
        .await?;
    assert_eq!(info.wid.as_str(), wid);
    assert_eq!(info.uid.as_ref().map(UserId::as_str), Some("rbrannan"));

    let profile = client.profiles().active_profile()?;
    assert_eq!(profile.wid().map(|w| w.as_str()), Some(wid));

    let entries = server.user_entries(wid);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field("User-ID"), Some("rbrannan"));
    Ok(())
}

#[tokio::test]
async fn test_redeem_bad_regcode() -> anyhow::Result<()> {
    let server = FakeMensagod::start(TEST_DOMAIN).await;
    let dir = tempfile::tempdir()?;
    let mut client = new_client(&server, &dir).await;

    let address: MAddress = format!("rbrannan/{}", TEST_DOMAIN).parse()?;
    let err = client
        .redeem_regcode(&address, "Not A Real Code", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.server_code(), Some(401));
    assert!(client.profiles().active_profile()?.wid().is_none());
    Ok(())
}
