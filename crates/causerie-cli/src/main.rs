//! # causerie-cli
//!
//! Demo driver for the Causerie encrypted messaging core.
//!
//! Simulates two devices sharing one document store: Alice creates a
//! conversation with Bob, both exchange encrypted messages through live
//! subscriptions, and Bob's unread counter is tracked and cleared. Every
//! payload crossing the store is ciphertext; the decrypted lines in the log
//! come from each device's own subscription.

mod config;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use causerie_chat::ChatService;
use causerie_shared::types::UserId;
use causerie_store::{
    DocumentStore, FileSecureStore, MemorySecureStore, MemoryStore, SecureStore,
};

use crate::config::CliConfig;

fn secure_store_for(config: &CliConfig, device: &str) -> anyhow::Result<Arc<dyn SecureStore>> {
    match &config.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let store = FileSecureStore::open_at(&dir.join(format!("{device}.json")))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemorySecureStore::new())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,causerie_chat=debug")),
        )
        .init();

    info!("Starting Causerie demo v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = CliConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. One shared document store, one service per simulated device
    // -----------------------------------------------------------------------
    let documents = MemoryStore::new();
    let alice_device = ChatService::new(
        Arc::new(documents.clone()),
        secure_store_for(&config, "device-alice")?,
    );
    let bob_device = ChatService::new(
        Arc::new(documents.clone()),
        secure_store_for(&config, "device-bob")?,
    );

    let alice: UserId = "alice".into();
    let bob: UserId = "bob".into();

    // -----------------------------------------------------------------------
    // 4. Conversation lifecycle
    // -----------------------------------------------------------------------
    let conversation = match alice_device.find_conversation(&alice, &bob).await? {
        Some(existing) => existing,
        None => {
            alice_device
                .create_conversation(&alice, &bob, "Alice", "Bob")
                .await?
        }
    };
    info!(%conversation, "conversation ready");

    let bob_view = bob_device
        .subscribe_to_messages(conversation, &bob, |messages| {
            for m in &messages {
                info!(sender = %m.sender, read = m.read, "bob sees: {}", m.text);
            }
        })
        .await?;

    let bob_list = bob_device
        .subscribe_to_conversations(&bob, |conversations| {
            for c in &conversations {
                info!(
                    conversation = %c.id,
                    unread = c.unread_for(&"bob".into()),
                    "bob's conversation list entry"
                );
            }
        })
        .await?;

    // -----------------------------------------------------------------------
    // 5. Exchange messages
    // -----------------------------------------------------------------------
    alice_device
        .send_message(conversation, &alice, "Partante pour un foot ce soir ?", &alice)
        .await?;
    alice_device
        .send_message(conversation, &alice, "19h au parc, comme d'habitude", &alice)
        .await?;
    bob_device
        .send_message(conversation, &bob, "Oui, j'arrive !", &bob)
        .await?;

    // Let the subscription ticks drain before inspecting counters.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let doc = documents.conversation(conversation).await?;
    info!(
        bob_unread = doc.unread_for(&bob),
        alice_unread = doc.unread_for(&alice),
        "unread before read receipts"
    );

    bob_device.mark_messages_as_read(conversation, &bob).await?;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let doc = documents.conversation(conversation).await?;
    info!(
        bob_unread = doc.unread_for(&bob),
        "unread after read receipts"
    );

    // -----------------------------------------------------------------------
    // 6. Release the live queries
    // -----------------------------------------------------------------------
    bob_view.unsubscribe();
    bob_list.unsubscribe();

    info!("Demo finished");
    Ok(())
}
