//! SQL shared by several importers: contributors, tags, link tables and
//! proofreading.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgConnection;

use crate::{de_opt_scalar, parse_compact_date};

pub async fn ensure_contributor(conn: &mut PgConnection, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO content.contributors (id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn ensure_tag(conn: &mut PgConnection, name: &str) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO content.tags (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
    )
    .bind(name)
    .fetch_one(conn)
    .await
}

/// Make `table` link `owner` to exactly `contributors`.
pub async fn relink_contributors(
    conn: &mut PgConnection,
    table: &'static str,
    owner_column: &'static str,
    owner: &str,
    contributors: &[String],
) -> Result<(), sqlx::Error> {
    for id in contributors {
        ensure_contributor(&mut *conn, id).await?;
    }
    sqlx::query(&format!(
        "DELETE FROM content.{table} WHERE {owner_column} = $1 AND NOT (contributor_id = ANY($2))"
    ))
    .bind(owner)
    .bind(contributors)
    .execute(&mut *conn)
    .await?;
    for id in contributors {
        sqlx::query(&format!(
            "INSERT INTO content.{table} ({owner_column}, contributor_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        ))
        .bind(owner)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Make `table` link `owner` to exactly `tags`, which must be lower-cased.
pub async fn relink_tags(
    conn: &mut PgConnection,
    table: &'static str,
    owner_column: &'static str,
    owner: &str,
    tags: &[String],
) -> Result<(), sqlx::Error> {
    let mut ids = Vec::with_capacity(tags.len());
    for tag in tags {
        ids.push(ensure_tag(&mut *conn, tag).await?);
    }
    sqlx::query(&format!(
        "DELETE FROM content.{table} WHERE {owner_column} = $1 AND NOT (tag_id = ANY($2))"
    ))
    .bind(owner)
    .bind(&ids)
    .execute(&mut *conn)
    .await?;
    for id in ids {
        sqlx::query(&format!(
            "INSERT INTO content.{table} ({owner_column}, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        ))
        .bind(owner)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// One `proofreading:` entry of a main YAML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProofreadingEntry {
    pub language: String,
    #[serde(default, deserialize_with = "de_opt_scalar")]
    pub last_contribution_date: Option<String>,
    pub urgency: Option<i32>,
    #[serde(default)]
    pub contributors_id: Vec<String>,
    pub reward: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proofreading {
    pub language: String,
    pub last_contribution_date: DateTime<Utc>,
    pub urgency: i32,
    pub reward: f64,
    /// Order is significant and stored as declared.
    pub contributors: Vec<String>,
}

impl ProofreadingEntry {
    pub fn validate(self) -> Result<Proofreading, String> {
        let language = self.language.trim().to_lowercase();
        if language.is_empty() {
            return Err("proofreading entry without a language".to_string());
        }
        let last_contribution_date = parse_compact_date(self.last_contribution_date.as_deref())
            .map_err(|e| format!("proofreading {language}: {e}"))?;
        Ok(Proofreading {
            language,
            last_contribution_date,
            urgency: self.urgency.unwrap_or(1),
            reward: self.reward.unwrap_or(0.0),
            contributors: self.contributors_id,
        })
    }
}

pub fn validate_proofreading(entries: Vec<ProofreadingEntry>) -> Result<Vec<Proofreading>, String> {
    entries.into_iter().map(ProofreadingEntry::validate).collect()
}

/// Which entity a proofreading row belongs to.
#[derive(Debug, Clone, Copy)]
pub enum ProofreadingOwner<'a> {
    Course(&'a str),
    Tutorial(&'a str),
    Resource(&'a str),
}

impl ProofreadingOwner<'_> {
    fn column(&self) -> &'static str {
        match self {
            ProofreadingOwner::Course(_) => "course_id",
            ProofreadingOwner::Tutorial(_) => "tutorial_id",
            ProofreadingOwner::Resource(_) => "resource_id",
        }
    }

    fn id(&self) -> &str {
        match self {
            ProofreadingOwner::Course(id) | ProofreadingOwner::Tutorial(id) | ProofreadingOwner::Resource(id) => id,
        }
    }
}

/// Delete localized rows of `owner` whose language is not in `languages`.
pub async fn prune_languages(
    conn: &mut PgConnection,
    table: &str,
    owner_column: &str,
    owner: &str,
    languages: &[String],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(&format!(
        "DELETE FROM content.{table} WHERE {owner_column} = $1 AND NOT (language = ANY($2))"
    ))
    .bind(owner)
    .bind(languages)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Upsert one row per language, then rewrite its ordered contributor list.
/// Languages no longer declared are removed along with their contributors.
pub async fn upsert_proofreading(
    conn: &mut PgConnection,
    owner: ProofreadingOwner<'_>,
    entries: &[Proofreading],
) -> Result<(), sqlx::Error> {
    let column = owner.column();
    let declared = entries.iter().map(|e| e.language.clone()).collect::<Vec<_>>();
    sqlx::query(&format!(
        "DELETE FROM content.proofreading_contributors WHERE proofreading_id IN
           (SELECT id FROM content.proofreading WHERE {column} = $1 AND NOT (language = ANY($2)))"
    ))
    .bind(owner.id())
    .bind(&declared)
    .execute(&mut *conn)
    .await?;
    prune_languages(&mut *conn, "proofreading", column, owner.id(), &declared).await?;

    for entry in entries {
        let id: i32 = sqlx::query_scalar(&format!(
            "INSERT INTO content.proofreading ({column}, language, last_contribution_date, urgency, reward)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT ({column}, language) DO UPDATE SET
               last_contribution_date = EXCLUDED.last_contribution_date,
               urgency = EXCLUDED.urgency,
               reward = EXCLUDED.reward
             RETURNING id"
        ))
        .bind(owner.id())
        .bind(&entry.language)
        .bind(entry.last_contribution_date)
        .bind(entry.urgency)
        .bind(entry.reward)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM content.proofreading_contributors WHERE proofreading_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        for (order, contributor) in entry.contributors.iter().enumerate() {
            ensure_contributor(&mut *conn, contributor).await?;
            sqlx::query(
                r#"INSERT INTO content.proofreading_contributors (proofreading_id, contributor_id, "order")
                   VALUES ($1, $2, $3)"#,
            )
            .bind(id)
            .bind(contributor)
            .bind(order as i32)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proofreading_keeps_declared_contributor_order() {
        let entries: Vec<ProofreadingEntry> = serde_yaml::from_str(
            "- language: FR\n  last_contribution_date: 20240301\n  urgency: 2\n  contributors_id: [zoe, alice, bob]\n  reward: 0.5\n",
        )
        .unwrap();
        let validated = validate_proofreading(entries).unwrap();
        assert_eq!(validated[0].language, "fr");
        assert_eq!(validated[0].contributors, vec!["zoe", "alice", "bob"]);
        assert_eq!(validated[0].urgency, 2);
        assert_eq!(
            validated[0].last_contribution_date.format("%Y%m%d").to_string(),
            "20240301"
        );
    }

    #[test]
    fn proofreading_requires_a_language() {
        let entry = ProofreadingEntry::default();
        assert!(entry.validate().is_err());
    }
}
