#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;

pub(crate) mod migration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use tokio_rusqlite::{Connection, OpenFlags, Row, Transaction, named_params, params};

use crate::models::{Assistant, Message, NewMessage, Role, Thread};
use crate::storage::Storage;

use migration::MIGRATION;

const ASSISTANT_COLUMNS: &str = "id, open_ai_assistant_id, name, system_prompt, created_at";
const THREAD_COLUMNS: &str = "id, openai_threadid, thread_title, assistant_id, created_at";
const MESSAGE_COLUMNS: &str = "id, thread_id, role, content, openai_message_id, created_at";

pub struct Sqlite {
    conn: Connection,
}

impl Sqlite {
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(path) => {
                if let Some(dir) = std::path::Path::new(path).parent() {
                    tokio::fs::create_dir_all(dir)
                        .await
                        .wrap_err(format!("creating database directory {}", dir.display()))?;
                }
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
                )
                .await
                .wrap_err(format!("opening database path: {}", path))?
            }
            None => Connection::open_in_memory()
                .await
                .wrap_err("opening in-memory database")?,
        };

        let ret = Self { conn };
        ret.run_migration().await.wrap_err("running migration")?;
        Ok(ret)
    }

    async fn run_migration(&self) -> Result<()> {
        self.conn
            .call(|conn| Ok(conn.execute_batch(MIGRATION)?))
            .await
            .wrap_err("executing migration")?;
        Ok(())
    }
}

#[async_trait]
impl Storage for Sqlite {
    async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        let assistants = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ASSISTANT_COLUMNS} FROM assistants ORDER BY created_at ASC, id ASC"
                ))?;
                let mut rows = stmt.query([])?;
                let mut assistants = vec![];
                while let Some(row) = rows.next()? {
                    assistants.push(assistant_from_row(row)?);
                }
                Ok(assistants)
            })
            .await
            .wrap_err("listing assistants")?;
        Ok(assistants)
    }

    async fn get_assistant(&self, id: i64) -> Result<Option<Assistant>> {
        let assistant = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ASSISTANT_COLUMNS} FROM assistants WHERE id = ?"
                ))?;
                let mut rows = stmt.query(params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(assistant_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .wrap_err(format!("getting assistant {}", id))?;
        Ok(assistant)
    }

    async fn create_assistant(
        &self,
        remote_id: &str,
        name: &str,
        system_prompt: &str,
    ) -> Result<Assistant> {
        let remote_id = remote_id.to_string();
        let name = name.to_string();
        let system_prompt = system_prompt.to_string();
        let created_at = Utc::now();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO assistants (open_ai_assistant_id, name, system_prompt, created_at)
                VALUES (:remote_id, :name, :system_prompt, :created_at)"#,
                    named_params! {
                        ":remote_id": remote_id,
                        ":name": name,
                        ":system_prompt": system_prompt,
                        ":created_at": created_at.timestamp_millis(),
                    },
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .wrap_err("inserting assistant")?;

        self.get_assistant(id)
            .await?
            .ok_or_else(|| eyre::eyre!("assistant {} vanished after insert", id))
    }

    async fn update_assistant(
        &self,
        id: i64,
        name: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<Option<Assistant>> {
        if name.is_some() || system_prompt.is_some() {
            self.conn
                .call(move |conn| {
                    conn.execute(
                        r#"UPDATE assistants SET
                    name = COALESCE(:name, name),
                    system_prompt = COALESCE(:system_prompt, system_prompt)
                WHERE id = :id"#,
                        named_params! {
                            ":name": name,
                            ":system_prompt": system_prompt,
                            ":id": id,
                        },
                    )?;
                    Ok(())
                })
                .await
                .wrap_err(format!("updating assistant {}", id))?;
        }
        self.get_assistant(id).await
    }

    async fn list_threads(&self, assistant_id: i64) -> Result<Vec<Thread>> {
        let threads = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {THREAD_COLUMNS} FROM threads WHERE assistant_id = ? ORDER BY created_at DESC, id DESC"
                ))?;
                let mut rows = stmt.query(params![assistant_id])?;
                let mut threads = vec![];
                while let Some(row) = rows.next()? {
                    threads.push(thread_from_row(row)?);
                }
                Ok(threads)
            })
            .await
            .wrap_err(format!("listing threads of assistant {}", assistant_id))?;
        Ok(threads)
    }

    async fn get_thread(&self, id: i64) -> Result<Option<Thread>> {
        let thread = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?"))?;
                let mut rows = stmt.query(params![id])?;
                match rows.next()? {
                    Some(row) => Ok(Some(thread_from_row(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .wrap_err(format!("getting thread {}", id))?;
        Ok(thread)
    }

    async fn create_thread(
        &self,
        remote_id: &str,
        title: &str,
        assistant_id: i64,
    ) -> Result<Thread> {
        let remote_id = remote_id.to_string();
        let title = title.to_string();
        let created_at = Utc::now();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO threads (openai_threadid, thread_title, assistant_id, created_at)
                VALUES (:remote_id, :title, :assistant_id, :created_at)"#,
                    named_params! {
                        ":remote_id": remote_id,
                        ":title": title,
                        ":assistant_id": assistant_id,
                        ":created_at": created_at.timestamp_millis(),
                    },
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .wrap_err("inserting thread")?;

        self.get_thread(id)
            .await?
            .ok_or_else(|| eyre::eyre!("thread {} vanished after insert", id))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<i64> {
        let thread_id = message.thread_id();
        let id = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                insert_message(&tx, &message)?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id)
            })
            .await
            .wrap_err(format!("inserting message into thread {}", thread_id))?;
        Ok(id)
    }

    async fn get_messages(&self, thread_id: i64) -> Result<Vec<Message>> {
        let messages = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = ? ORDER BY created_at ASC, id ASC"
                ))?;
                let mut rows = stmt.query(params![thread_id])?;
                let mut messages = vec![];
                while let Some(row) = rows.next()? {
                    messages.push(message_from_row(row)?);
                }
                Ok(messages)
            })
            .await
            .wrap_err(format!("getting messages of thread {}", thread_id))?;
        Ok(messages)
    }

    async fn replace_messages(&self, thread_id: i64, messages: Vec<NewMessage>) -> Result<usize> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM messages WHERE thread_id = ?", params![thread_id])?;
                let mut inserted = 0;
                for message in &messages {
                    inserted += insert_message(&tx, message)?;
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
            .wrap_err(format!("replacing messages of thread {}", thread_id))?;
        Ok(inserted)
    }
}

fn insert_message(
    tx: &Transaction<'_>,
    message: &NewMessage,
) -> std::result::Result<usize, tokio_rusqlite::Error> {
    Ok(tx.execute(
        r#"INSERT INTO messages (thread_id, role, content, openai_message_id, created_at)
            VALUES (:thread_id, :role, :content, :openai_message_id, :created_at)"#,
        named_params! {
            ":thread_id": message.thread_id(),
            ":role": message.role().as_str(),
            ":content": message.content(),
            ":openai_message_id": message.upstream_id(),
            ":created_at": message.created_at().timestamp_millis(),
        },
    )?)
}

fn assistant_from_row(row: &Row<'_>) -> std::result::Result<Assistant, tokio_rusqlite::Error> {
    Ok(Assistant {
        id: row.get(0)?,
        open_ai_assistant_id: row.get(1)?,
        name: row.get(2)?,
        system_prompt: row.get(3)?,
        created_at: from_millis(row.get(4)?)?,
    })
}

fn thread_from_row(row: &Row<'_>) -> std::result::Result<Thread, tokio_rusqlite::Error> {
    Ok(Thread {
        id: row.get(0)?,
        openai_threadid: row.get(1)?,
        thread_title: row.get(2)?,
        assistant_id: row.get(3)?,
        created_at: from_millis(row.get(4)?)?,
    })
}

fn message_from_row(row: &Row<'_>) -> std::result::Result<Message, tokio_rusqlite::Error> {
    let role: String = row.get(2)?;
    let role = role
        .parse::<Role>()
        .map_err(|err| tokio_rusqlite::Error::Other(err.into()))?;
    Ok(Message {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        role,
        content: row.get(3)?,
        openai_message_id: row.get(4)?,
        created_at: from_millis(row.get(5)?)?,
    })
}

fn from_millis(millis: i64) -> std::result::Result<DateTime<Utc>, tokio_rusqlite::Error> {
    DateTime::from_timestamp_millis(millis).ok_or(tokio_rusqlite::Error::Other(
        eyre::eyre!("invalid timestamp: {}", millis).into(),
    ))
}
