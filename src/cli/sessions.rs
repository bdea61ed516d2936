use std::{collections::BTreeSet, path::Path, sync::Arc};

use anyhow::Result;
use chrono::Local;
use clap::Subcommand;
use uuid::Uuid;

use crate::{
    storage::{
        entities::{FinalizedSession, SessionEdit},
        query::SessionQuery,
        UsageStorage,
    },
    tracker::{config::TrackerConfig, lifecycle::SessionLifecycleManager},
    utils::time::format_seconds,
};

use super::dates::DateArgs;

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    #[command(about = "List sessions started in a range of days")]
    List {
        #[command(flatten)]
        dates: DateArgs,
        #[arg(long, help = "Only sessions with this tag")]
        tag: Option<String>,
    },
    #[command(about = "Replace the tags of a session. Without tags all tags are removed")]
    Tag { id: Uuid, tags: Vec<String> },
    #[command(about = "Change the title or description of a session")]
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, help = "New description. An empty value removes it")]
        description: Option<String>,
    },
    #[command(about = "Delete a session")]
    Delete { id: Uuid },
}

pub async fn process_sessions_command<S: UsageStorage>(
    app_dir: &Path,
    storage: S,
    command: SessionsCommand,
) -> Result<()> {
    let config = TrackerConfig::load(app_dir)?;
    let storage = Arc::new(storage);
    let manager = SessionLifecycleManager::new(
        storage.clone(),
        config.min_session(),
        config.session_prompt_timeout(),
    );

    match command {
        SessionsCommand::List { dates, tag } => {
            let query = SessionQuery {
                range: dates.range()?,
                tag,
            };
            let sessions = storage.query_sessions(&query).await?;
            if sessions.is_empty() {
                println!("No sessions found");
            }
            for session in sessions {
                println!("{}", format_session(&session));
            }
        }
        SessionsCommand::Tag { id, tags } => {
            let tags: BTreeSet<String> = tags.into_iter().collect();
            let cleared = tags.is_empty();
            manager.set_tags(id, tags).await?;
            if cleared {
                println!("Removed all tags from {id}");
            } else {
                println!("Updated tags of {id}");
            }
        }
        SessionsCommand::Edit {
            id,
            title,
            description,
        } => {
            let session = manager.edit(id, SessionEdit { title, description }).await?;
            println!("{}", format_session(&session));
        }
        SessionsCommand::Delete { id } => {
            manager.delete(id).await?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

fn format_session(session: &FinalizedSession) -> String {
    let mut line = format!(
        "{}\t{}\t{}\t{}",
        session.id,
        session.start_time.with_timezone(&Local).format("%x %H:%M"),
        format_seconds(session.duration_seconds),
        session.title,
    );
    if !session.tags.is_empty() {
        let tags: Vec<&str> = session.tags.iter().map(String::as_str).collect();
        line.push_str(&format!("\t[{}]", tags.join(", ")));
    }
    if let Some(description) = &session.description {
        line.push_str(&format!("\n\t{description}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use crate::storage::entities::FinalizedSession;

    use super::format_session;

    #[test]
    fn test_format_session_lists_tags_and_description() {
        let session = FinalizedSession {
            id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2025, 3, 16).unwrap(),
            start_time: Utc.with_ymd_and_hms(2025, 3, 16, 10, 0, 0).unwrap(),
            duration_seconds: 3725,
            title: "Parser".into(),
            description: Some("Error recovery".into()),
            tags: BTreeSet::from(["work".to_string(), "rust".to_string()]),
            user_id: None,
        };

        let line = format_session(&session);

        assert!(line.contains("1h2m5s\tParser\t[rust, work]"));
        assert!(line.ends_with("\n\tError recovery"));
    }
}
