//! Asset commands: images, narration, coloring variants

use super::{parse_story_id, print_json, Session};
use anyhow::{bail, Result};
use fable_asset_gen::{ServiceStatus, VoiceOptions};
use serde_json::json;

pub fn image(session: &Session, id: &str) -> Result<()> {
    let outcome = session
        .orchestrator
        .create_image(&parse_story_id(id)?, &session.owner)?;
    print_json(&json!({
        "id": outcome.story.id,
        "image": outcome.story.image(),
        "source": outcome.source,
    }))
}

pub fn voice(session: &Session, id: &str, voice: Option<String>, speed: Option<f32>) -> Result<()> {
    let story = session.orchestrator.create_voice(
        &parse_story_id(id)?,
        &session.owner,
        &VoiceOptions { voice, speed },
    )?;
    print_json(&json!({
        "id": story.id,
        "voice": story.voice(),
        "voice_style": story.voice_style,
        "image": story.image(),
    }))
}

pub fn black_white(session: &Session, url: &str) -> Result<()> {
    let bw = session.orchestrator.black_white(url);
    print_json(&json!({
        "original": url,
        "bw": bw,
        "converted": bw != url,
    }))
}

pub fn voice_url(session: &Session, id: &str, minutes: u32) -> Result<()> {
    if minutes == 0 {
        bail!("--minutes must be at least 1");
    }
    let url = session
        .orchestrator
        .temporary_voice_url(&parse_story_id(id)?, &session.owner, minutes)?;
    print_json(&json!({ "url": url, "expires_in_minutes": minutes }))
}

pub fn template(session: &Session, id: &str) -> Result<()> {
    let template = session
        .orchestrator
        .create_template_now(&parse_story_id(id)?, &session.owner)?;
    print_json(&template)
}

pub fn health(session: &Session) -> Result<()> {
    let report = session.orchestrator.health();
    let (service_ok, service_detail) = match &report.service {
        ServiceStatus::Available => (true, None),
        ServiceStatus::Unavailable(reason) => (false, Some(reason.clone())),
    };

    print_json(&json!({
        "service": { "available": service_ok, "detail": service_detail },
        "storage": { "available": report.storage_available },
    }))?;

    if !service_ok || !report.storage_available {
        bail!("one or more collaborators are unavailable");
    }
    Ok(())
}
