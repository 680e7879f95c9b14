//! Database schema for agents, knowledge and teaching sessions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the pupil database.
pub const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    personality TEXT NOT NULL,
    level INTEGER NOT NULL DEFAULT 1,
    total_xp INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- One row per agent and concept
CREATE TABLE IF NOT EXISTS concept_knowledge (
    agent_id TEXT NOT NULL,
    concept TEXT NOT NULL,
    understanding_level REAL NOT NULL CHECK (understanding_level >= 0.0 AND understanding_level <= 1.0),
    examples_seen INTEGER NOT NULL DEFAULT 0 CHECK (examples_seen >= 0),
    last_reviewed TEXT NOT NULL,
    mastery_awarded INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (agent_id, concept),
    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    agent_id TEXT NOT NULL,
    concept TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    xp_earned INTEGER NOT NULL DEFAULT 0,
    turns INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    emotion TEXT,
    understanding_delta REAL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

INSERT OR IGNORE INTO schema_version (version) VALUES (1);

CREATE INDEX IF NOT EXISTS idx_sessions_agent_id ON sessions(agent_id);
CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);
CREATE INDEX IF NOT EXISTS idx_knowledge_last_reviewed ON concept_knowledge(last_reviewed);
";
