//! `SQLite` store with async operations.
//!
//! All queries run on the blocking pool behind a single connection mutex.
//! Multi-statement updates use immediate transactions so a knowledge row is
//! never read and rewritten by two turns at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::StoreError;
use super::schema::SCHEMA;
use super::types::{
    Agent, InteractionRecord, Message, Role, TeachingSession, TurnCommit, TurnRecord, XpAward,
};
use crate::knowledge::{
    apply_decay, apply_interaction_delta, mastery_bonus, settle_levels, xp_for_emotion,
    ConceptKnowledge, Emotion,
};

const AGENT_COLUMNS: &str = "id, name, personality, level, total_xp, created_at";
const KNOWLEDGE_COLUMNS: &str =
    "agent_id, concept, understanding_level, examples_seen, last_reviewed, mastery_awarded";
const SESSION_COLUMNS: &str = "id, agent_id, concept, started_at, ended_at, xp_earned, turns";
const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, emotion, understanding_delta, created_at";

/// Returns the default path for the database.
///
/// This is `~/.local/share/ai-pupil/pupil.db` on Unix systems.
#[must_use]
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ai-pupil")
        .join("pupil.db")
}

/// Persistent store for agents, their knowledge, and teaching sessions.
#[derive(Debug, Clone)]
pub struct PupilStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl PupilStore {
    /// Open a store at the specified path.
    ///
    /// Creates parent directories if they don't exist and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let path_clone = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn =
                Connection::open(&path_clone).map_err(|source| StoreError::DatabaseOpen {
                    path: path_clone,
                    source,
                })?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| StoreError::TaskCancelled)??;

        tracing::debug!(path = %path.display(), "Opened pupil database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, StoreError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| StoreError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Returns the path to the database, if opened from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|_| StoreError::TaskCancelled)?
    }

    /// Insert a new agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent cannot be inserted.
    pub async fn create_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        let agent = agent.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agents (id, name, personality, level, total_xp, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    agent.id.to_string(),
                    agent.name,
                    agent.personality,
                    agent.level,
                    agent.total_xp,
                    agent.created_at
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Fetch an agent.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AgentNotFound` if no such agent exists.
    pub async fn get_agent(&self, agent_id: Uuid) -> Result<Agent, StoreError> {
        self.with_conn(move |conn| load_agent(conn, agent_id)).await
    }

    /// List all agents, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at, rowid"
            ))?;
            let agents = stmt
                .query_map([], agent_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(agents)
        })
        .await
    }

    /// Fetch the stored (not decay-corrected) knowledge row for a concept.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_knowledge(
        &self,
        agent_id: Uuid,
        concept: &str,
    ) -> Result<Option<ConceptKnowledge>, StoreError> {
        let concept = concept.to_string();
        self.with_conn(move |conn| load_knowledge(conn, agent_id, &concept))
            .await
    }

    /// List every stored knowledge row of an agent, ordered by concept.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_knowledge(
        &self,
        agent_id: Uuid,
    ) -> Result<Vec<ConceptKnowledge>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM concept_knowledge WHERE agent_id = ?1 ORDER BY concept"
            ))?;
            let rows = stmt
                .query_map(params![agent_id.to_string()], knowledge_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Decay-correct and update one knowledge row in a single transaction.
    ///
    /// Inserts the row with the clamped delta as its starting level when the
    /// agent has never touched the concept.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AgentNotFound` if the agent does not exist.
    pub async fn record_interaction(
        &self,
        agent_id: Uuid,
        concept: &str,
        delta: f64,
        now: DateTime<Utc>,
    ) -> Result<InteractionRecord, StoreError> {
        let concept = concept.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let record = upsert_interaction(&tx, agent_id, &concept, delta, now)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    /// Add XP to an agent and advance its level if thresholds are crossed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AgentNotFound` if the agent does not exist.
    pub async fn award_xp(
        &self,
        agent_id: Uuid,
        xp: u64,
        thresholds: &[u64],
    ) -> Result<XpAward, StoreError> {
        let thresholds = thresholds.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let award = award_xp_tx(&tx, agent_id, xp, &thresholds)?;
            tx.commit()?;
            Ok(award)
        })
        .await
    }

    /// Persist a successful teaching turn atomically.
    ///
    /// Updates the knowledge row, pays XP (emotion plus any mastery bonus),
    /// advances the agent's level, bumps session counters, and stores the
    /// student's reply. Either all of it is written or none of it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionEnded` if the session was closed while the
    /// reply was being generated, `StoreError::SessionNotFound` if it does not
    /// exist, or any query error. The transaction is rolled back in every case.
    pub async fn commit_turn(
        &self,
        turn: TurnCommit,
        thresholds: &[u64],
    ) -> Result<TurnRecord, StoreError> {
        let thresholds = thresholds.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let interaction = upsert_interaction(
                &tx,
                turn.agent_id,
                &turn.concept,
                turn.understanding_delta,
                turn.now,
            )?;
            let xp = xp_for_emotion(turn.emotion) + interaction.mastery_bonus;
            let award = award_xp_tx(&tx, turn.agent_id, xp, &thresholds)?;

            let updated = tx.execute(
                "UPDATE sessions SET turns = turns + 1, xp_earned = xp_earned + ?1
                 WHERE id = ?2 AND ended_at IS NULL",
                params![xp, turn.session_id.to_string()],
            )?;
            if updated == 0 {
                load_session(&tx, turn.session_id)?;
                return Err(StoreError::SessionEnded(turn.session_id));
            }
            insert_message(&tx, &turn.student_message)?;

            tx.commit()?;
            Ok(TurnRecord { interaction, award })
        })
        .await
    }

    /// Insert a new teaching session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AgentNotFound` if the agent does not exist.
    pub async fn start_session(&self, session: &TeachingSession) -> Result<(), StoreError> {
        let session = session.clone();
        self.with_conn(move |conn| {
            load_agent(conn, session.agent_id)?;
            conn.execute(
                "INSERT INTO sessions (id, agent_id, concept, started_at, ended_at, xp_earned, turns)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id.to_string(),
                    session.agent_id.to_string(),
                    session.concept,
                    session.started_at,
                    session.ended_at,
                    session.xp_earned,
                    session.turns
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Fetch a session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionNotFound` if no such session exists.
    pub async fn get_session(&self, session_id: Uuid) -> Result<TeachingSession, StoreError> {
        self.with_conn(move |conn| load_session(conn, session_id))
            .await
    }

    /// Mark a session as ended. Ending an already ended session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SessionNotFound` if no such session exists.
    pub async fn end_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TeachingSession, StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE sessions SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
                params![now, session_id.to_string()],
            )?;
            load_session(conn, session_id)
        })
        .await
    }

    /// Append a transcript message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be inserted.
    pub async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let message = message.clone();
        self.with_conn(move |conn| insert_message(conn, &message))
            .await
    }

    /// The most recent `limit` messages of a session, in chronological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1
                 ORDER BY rowid DESC LIMIT ?2"
            ))?;
            let mut messages = stmt
                .query_map(
                    params![
                        session_id.to_string(),
                        i64::try_from(limit).unwrap_or(i64::MAX)
                    ],
                    message_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

fn upsert_interaction(
    conn: &Connection,
    agent_id: Uuid,
    concept: &str,
    delta: f64,
    now: DateTime<Utc>,
) -> Result<InteractionRecord, StoreError> {
    load_agent(conn, agent_id)?;

    let record = match load_knowledge(conn, agent_id, concept)? {
        Some(existing) => {
            let previous_level =
                apply_decay(existing.last_reviewed, existing.understanding_level, now);
            let new_level = apply_interaction_delta(previous_level, delta);
            let bonus = if existing.mastery_awarded {
                0
            } else {
                mastery_bonus(previous_level, new_level)
            };
            let knowledge = ConceptKnowledge {
                understanding_level: new_level,
                examples_seen: existing.examples_seen.saturating_add(1),
                last_reviewed: now,
                mastery_awarded: existing.mastery_awarded || bonus > 0,
                ..existing
            };
            conn.execute(
                "UPDATE concept_knowledge
                 SET understanding_level = ?1, examples_seen = ?2, last_reviewed = ?3, mastery_awarded = ?4
                 WHERE agent_id = ?5 AND concept = ?6",
                params![
                    knowledge.understanding_level,
                    knowledge.examples_seen,
                    knowledge.last_reviewed,
                    knowledge.mastery_awarded,
                    agent_id.to_string(),
                    concept
                ],
            )?;
            InteractionRecord {
                previous_level,
                new_level,
                mastery_bonus: bonus,
                knowledge,
            }
        }
        None => {
            let new_level = apply_interaction_delta(0.0, delta);
            let bonus = mastery_bonus(0.0, new_level);
            let knowledge = ConceptKnowledge {
                agent_id,
                concept: concept.to_string(),
                understanding_level: new_level,
                examples_seen: 1,
                last_reviewed: now,
                mastery_awarded: bonus > 0,
            };
            conn.execute(
                &format!(
                    "INSERT INTO concept_knowledge ({KNOWLEDGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    agent_id.to_string(),
                    knowledge.concept,
                    knowledge.understanding_level,
                    knowledge.examples_seen,
                    knowledge.last_reviewed,
                    knowledge.mastery_awarded
                ],
            )?;
            InteractionRecord {
                previous_level: 0.0,
                new_level,
                mastery_bonus: bonus,
                knowledge,
            }
        }
    };

    tracing::debug!(
        agent_id = %agent_id,
        concept,
        previous = record.previous_level,
        new = record.new_level,
        "Updated concept knowledge"
    );

    Ok(record)
}

fn award_xp_tx(
    conn: &Connection,
    agent_id: Uuid,
    xp: u64,
    thresholds: &[u64],
) -> Result<XpAward, StoreError> {
    let agent = load_agent(conn, agent_id)?;
    let total_xp = agent.total_xp.saturating_add(xp);
    let progress = settle_levels(total_xp, agent.level, thresholds);

    conn.execute(
        "UPDATE agents SET total_xp = ?1, level = ?2 WHERE id = ?3",
        params![total_xp, progress.new_level, agent_id.to_string()],
    )?;

    if progress.leveled_up {
        tracing::info!(
            agent_id = %agent_id,
            from = agent.level,
            to = progress.new_level,
            total_xp,
            "Agent leveled up"
        );
    }

    Ok(XpAward {
        xp_awarded: xp,
        total_xp,
        previous_level: agent.level,
        level: progress.new_level,
        leveled_up: progress.leveled_up,
    })
}

fn insert_message(conn: &Connection, message: &Message) -> Result<(), StoreError> {
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            message.id.to_string(),
            message.session_id.to_string(),
            message.role.as_str(),
            message.content,
            message.emotion.map(|e| e.as_str()),
            message.understanding_delta,
            message.created_at
        ],
    )?;
    Ok(())
}

fn load_agent(conn: &Connection, agent_id: Uuid) -> Result<Agent, StoreError> {
    conn.query_row(
        &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
        params![agent_id.to_string()],
        agent_from_row,
    )
    .optional()?
    .ok_or(StoreError::AgentNotFound(agent_id))
}

fn load_knowledge(
    conn: &Connection,
    agent_id: Uuid,
    concept: &str,
) -> Result<Option<ConceptKnowledge>, StoreError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM concept_knowledge WHERE agent_id = ?1 AND concept = ?2"
            ),
            params![agent_id.to_string(), concept],
            knowledge_from_row,
        )
        .optional()?;
    Ok(row)
}

fn load_session(conn: &Connection, session_id: Uuid) -> Result<TeachingSession, StoreError> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
        params![session_id.to_string()],
        session_from_row,
    )
    .optional()?
    .ok_or(StoreError::SessionNotFound(session_id))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        personality: row.get(2)?,
        level: row.get(3)?,
        total_xp: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn knowledge_from_row(row: &Row<'_>) -> rusqlite::Result<ConceptKnowledge> {
    Ok(ConceptKnowledge {
        agent_id: uuid_at(row, 0)?,
        concept: row.get(1)?,
        understanding_level: row.get(2)?,
        examples_seen: row.get(3)?,
        last_reviewed: row.get(4)?,
        mastery_awarded: row.get(5)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<TeachingSession> {
    Ok(TeachingSession {
        id: uuid_at(row, 0)?,
        agent_id: uuid_at(row, 1)?,
        concept: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        xp_earned: row.get(5)?,
        turns: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let emotion: Option<String> = row.get(4)?;
    Ok(Message {
        id: uuid_at(row, 0)?,
        session_id: uuid_at(row, 1)?,
        role: Role::from_db(&role),
        content: row.get(3)?,
        emotion: emotion.as_deref().map(Emotion::parse_lenient),
        understanding_delta: row.get(5)?,
        created_at: row.get(6)?,
    })
}
