//! User model and repository

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::DbPool;
use crate::{Error, Result};

/// Labels an email address can be filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmailLabel {
    #[serde(rename = "WORK")]
    Work,
    #[serde(rename = "PERSONAL")]
    Personal,
}

/// A registered user. Users are never evicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    #[serde(rename = "userID")]
    pub user_id: String,
    pub name: String,
    pub surname: String,
    /// Labeled email addresses; last write wins
    pub email_addresses: BTreeMap<EmailLabel, String>,
}

/// User repository
#[derive(Clone)]
pub struct UserRepo {
    pool: DbPool,
}

impl UserRepo {
    /// Create a new user repository
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// Insert a user; if the id already exists, replace the email addresses
    /// only, leaving name and surname untouched
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn upsert(&self, user: &User) -> Result<()> {
        let emails = serde_json::to_string(&user.email_addresses)?;

        self.conn()?
            .execute(
                "INSERT INTO users (user_id, name, surname, email_addresses)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    email_addresses = excluded.email_addresses",
                rusqlite::params![user.user_id, user.name, user.surname, emails],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Retrieve a user by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn find(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let row = conn.query_row(
            "SELECT user_id, name, surname, email_addresses FROM users WHERE user_id = ?1",
            [user_id],
            row_to_user,
        );
        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Database(e.to_string())),
        }
    }

    /// Retrieve every registered user
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn list_all(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT user_id, name, surname, email_addresses FROM users ORDER BY user_id")
            .map_err(|e| Error::Database(e.to_string()))?;
        let users = stmt
            .query_map([], row_to_user)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let emails: String = row.get(3)?;
    Ok(User {
        user_id: row.get(0)?,
        name: row.get(1)?,
        surname: row.get(2)?,
        email_addresses: serde_json::from_str(&emails).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn sample_user(emails: &[(EmailLabel, &str)]) -> User {
        User {
            user_id: "u1".to_string(),
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            email_addresses: emails
                .iter()
                .map(|(label, addr)| (*label, (*addr).to_string()))
                .collect(),
        }
    }

    #[test]
    fn upsert_and_find_round_trip() {
        let repo = UserRepo::new(db::init_memory().unwrap());
        let user = sample_user(&[(EmailLabel::Work, "ada@work.example")]);
        repo.upsert(&user).unwrap();
        assert_eq!(repo.find("u1").unwrap().unwrap(), user);
    }

    #[test]
    fn email_addresses_are_last_write_wins() {
        let repo = UserRepo::new(db::init_memory().unwrap());
        repo.upsert(&sample_user(&[(EmailLabel::Work, "ada@work.example")]))
            .unwrap();

        let mut second = sample_user(&[(EmailLabel::Personal, "ada@home.example")]);
        second.name = "Someone".to_string();
        repo.upsert(&second).unwrap();

        let found = repo.find("u1").unwrap().unwrap();
        // Addresses replaced wholesale, identity fields untouched.
        assert_eq!(
            found.email_addresses,
            BTreeMap::from([(EmailLabel::Personal, "ada@home.example".to_string())])
        );
        assert_eq!(found.name, "Ada");
    }
}
