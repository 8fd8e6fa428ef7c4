//! CLI command implementations

pub mod asset;
pub mod story;

use anyhow::{Context, Result};
use fable_asset_gen::services::create_service;
use fable_asset_gen::{AssetOrchestrator, FableConfig};
use fable_core::{OwnerId, StoryId};
use fable_storage::{FsObjectStore, TomlRecordStore};
use serde::Serialize;
use std::sync::Arc;

/// Everything a command needs: the wired orchestrator and the acting owner
pub struct Session {
    pub orchestrator: AssetOrchestrator,
    pub owner: OwnerId,
}

impl Session {
    pub fn open(mock: bool, owner: &str) -> Result<Self> {
        let config = FableConfig::load().context("Failed to load configuration")?;

        let service_name = if mock { "mock" } else { "http" };
        let service = create_service(service_name, &config)?;
        tracing::debug!(service = service.name(), url = %config.service.base_url, "generation service");

        let store = FsObjectStore::new(
            &config.storage.root,
            &config.storage.public_url,
            &config.storage.presign_secret,
        )
        .context("Failed to open object storage")?;
        let records = Arc::new(TomlRecordStore::new(&config.records_root));

        let orchestrator = AssetOrchestrator::new(
            config,
            Arc::from(service),
            Arc::new(store),
            records.clone(),
            records.clone(),
            records,
        )
        .context("Failed to start asset orchestrator")?;

        Ok(Self {
            orchestrator,
            owner: OwnerId::new(owner),
        })
    }
}

pub fn parse_story_id(id: &str) -> Result<StoryId> {
    StoryId::parse(id).with_context(|| format!("'{}' is not a valid story id", id))
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
