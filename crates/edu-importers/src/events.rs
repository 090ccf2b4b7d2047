//! Events: a single `events/<id>/events.yml`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use edu_core::{ChangedContent, ContentType, SyncErrors};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::{de_opt_scalar, freshness, load_yaml, parse_local_datetime, ContentImporter, ImportError};

pub const MAIN_FILE: &str = "events.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMain {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub end_date: Option<String>,
    pub timezone: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub address_line_3: Option<String>,
    pub builder: Option<String>,
    pub website_url: Option<String>,
    pub replay_url: Option<String>,
    pub live_url: Option<String>,
    pub language: Option<String>,
    pub is_online: Option<bool>,
    pub is_in_person: Option<bool>,
    pub price_dollars: Option<f64>,
    pub available_seats: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub name: String,
    pub event_type: Option<String>,
    pub description: Option<String>,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub timezone: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub address_line_3: Option<String>,
    pub builder: Option<String>,
    pub website_url: Option<String>,
    pub replay_url: Option<String>,
    pub live_url: Option<String>,
    pub language: Option<String>,
    pub is_online: bool,
    pub is_in_person: bool,
    pub price_dollars: f64,
    pub available_seats: Option<i32>,
}

impl EventMain {
    /// A missing end date means a single-point event.
    pub fn validate(self, id: &str) -> Result<EventRecord, String> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| "missing event name".to_string())?;
        let start_date = parse_local_datetime(self.start_date.as_deref().ok_or("missing start_date")?)?;
        let end_date = match self.end_date.as_deref() {
            Some(raw) => parse_local_datetime(raw)?,
            None => start_date,
        };
        if end_date < start_date {
            return Err(format!("end_date {end_date} is before start_date {start_date}"));
        }
        Ok(EventRecord {
            id: id.to_string(),
            name,
            event_type: self.event_type,
            description: self.description,
            start_date,
            end_date,
            timezone: self.timezone,
            address_line_1: self.address_line_1,
            address_line_2: self.address_line_2,
            address_line_3: self.address_line_3,
            builder: self.builder,
            website_url: self.website_url,
            replay_url: self.replay_url,
            live_url: self.live_url,
            language: self.language.map(|l| l.to_lowercase()),
            is_online: self.is_online.unwrap_or(false),
            is_in_person: self.is_in_person.unwrap_or(false),
            price_dollars: self.price_dollars.unwrap_or(0.0),
            available_seats: self.available_seats,
        })
    }
}

pub struct EventImporter;

#[async_trait]
impl ContentImporter for EventImporter {
    fn content_type(&self) -> ContentType {
        ContentType::Events
    }

    async fn import_entity(
        &self,
        pool: &PgPool,
        content: &ChangedContent,
        _errors: &mut SyncErrors,
    ) -> Result<(), ImportError> {
        let Some(main_file) = content.main_file(MAIN_FILE) else {
            debug!(path = %content.group_path, "no events.yml, skipping");
            return Ok(());
        };
        let main: EventMain = load_yaml(main_file).await?;
        let event = main
            .validate(&content.natural_id)
            .map_err(|m| ImportError::invalid(&main_file.path, m))?;
        let (last_updated, last_commit): (DateTime<Utc>, String) = freshness(content);

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO content.events
               (id, name, type, description, start_date, end_date, timezone, address_line_1, address_line_2,
                address_line_3, builder, website_url, replay_url, live_url, language, is_online, is_in_person,
                price_dollars, available_seats, last_updated, last_commit, last_sync)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, NOW())
             ON CONFLICT (id) DO UPDATE SET
               name = EXCLUDED.name,
               type = EXCLUDED.type,
               description = EXCLUDED.description,
               start_date = EXCLUDED.start_date,
               end_date = EXCLUDED.end_date,
               timezone = EXCLUDED.timezone,
               address_line_1 = EXCLUDED.address_line_1,
               address_line_2 = EXCLUDED.address_line_2,
               address_line_3 = EXCLUDED.address_line_3,
               builder = EXCLUDED.builder,
               website_url = EXCLUDED.website_url,
               replay_url = EXCLUDED.replay_url,
               live_url = EXCLUDED.live_url,
               language = EXCLUDED.language,
               is_online = EXCLUDED.is_online,
               is_in_person = EXCLUDED.is_in_person,
               price_dollars = EXCLUDED.price_dollars,
               available_seats = EXCLUDED.available_seats,
               last_updated = EXCLUDED.last_updated,
               last_commit = EXCLUDED.last_commit,
               last_sync = NOW()",
        )
        .bind(&event.id)
        .bind(&event.name)
        .bind(&event.event_type)
        .bind(&event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(&event.timezone)
        .bind(&event.address_line_1)
        .bind(&event.address_line_2)
        .bind(&event.address_line_3)
        .bind(&event.builder)
        .bind(&event.website_url)
        .bind(&event.replay_url)
        .bind(&event.live_url)
        .bind(&event.language)
        .bind(event.is_online)
        .bind(event.is_in_person)
        .bind(event.price_dollars)
        .bind(event.available_seats)
        .bind(last_updated)
        .bind(&last_commit)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!(event = %event.id, "event imported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_defaults_and_single_point_dates() {
        let main: EventMain =
            serde_yaml::from_str("name: Meetup\ntype: conference\nstart_date: 2024-09-01T18:00\n").unwrap();
        let event = main.validate("meetup-paris").unwrap();
        assert_eq!(event.event_type.as_deref(), Some("conference"));
        assert_eq!(event.end_date, event.start_date);
        assert!(!event.is_online);
        assert_eq!(event.price_dollars, 0.0);
    }

    #[test]
    fn event_rejects_inverted_range() {
        let main: EventMain = serde_yaml::from_str(
            "name: Meetup\nstart_date: 2024-09-02T18:00\nend_date: 2024-09-01T18:00\n",
        )
        .unwrap();
        assert!(main.validate("x").unwrap_err().contains("before"));
    }

    #[test]
    fn event_requires_a_start() {
        let main: EventMain = serde_yaml::from_str("name: Meetup\n").unwrap();
        assert!(main.validate("x").is_err());
    }
}
