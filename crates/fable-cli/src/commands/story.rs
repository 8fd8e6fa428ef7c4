//! Story commands

use super::{parse_story_id, print_json, Session};
use anyhow::Result;
use clap::Subcommand;
use fable_asset_gen::StoryCreateRequest;
use serde_json::json;

#[derive(Subcommand)]
pub enum StoryCommands {
    /// Generate a new story
    Create {
        /// Story theme (e.g. "forest", "sea")
        theme: String,

        /// Narration voice style to remember for the story
        #[arg(long)]
        voice: Option<String>,

        /// Name of the child the story is for
        #[arg(long)]
        child: Option<String>,
    },

    /// Show a story
    Show {
        /// Story id
        id: String,
    },

    /// List the owner's stories, newest first
    List,

    /// Delete a story and its voice track
    Delete {
        /// Story id
        id: String,
    },
}

pub fn run(session: &Session, cmd: StoryCommands) -> Result<()> {
    let orchestrator = &session.orchestrator;
    let owner = &session.owner;

    match cmd {
        StoryCommands::Create {
            theme,
            voice,
            child,
        } => {
            let story = orchestrator.create_story(
                owner,
                &StoryCreateRequest {
                    theme,
                    voice,
                    child_name: child,
                },
            )?;
            print_json(&story)
        }
        StoryCommands::Show { id } => {
            let story = orchestrator.get_story(&parse_story_id(&id)?, owner)?;
            print_json(&story)
        }
        StoryCommands::List => {
            let stories = orchestrator.list_stories(owner)?;
            let summary: Vec<_> = stories
                .iter()
                .map(|s| {
                    json!({
                        "id": s.id,
                        "title": s.title,
                        "image": s.image(),
                        "voice": s.voice(),
                        "created_at": s.created_at,
                    })
                })
                .collect();
            print_json(&summary)
        }
        StoryCommands::Delete { id } => {
            let id = parse_story_id(&id)?;
            orchestrator.delete_story(&id, owner)?;
            print_json(&json!({ "deleted": id }))
        }
    }
}
