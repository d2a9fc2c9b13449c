use std::path::Path;

use anyhow::{anyhow, Context, Result};
use redress_core::{
    format_complaint_reference, format_enquiry_uid, Complaint, ComplaintClassification,
    ComplaintSection, ComplaintStatus, Decision, DecisionProvider, Director, DirectorDraft,
    Enquiry, EnquiryDraft, EnquiryFile, EnquiryFileDraft, Issue, NotUpheldReason, Outcome,
    Product, Provider, RegisterError, SectionPayload, Sector, SubmitReceipt,
    DEFAULT_DIRECTOR_ROLE, ENQUIRY_STATUS_OPEN,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sectors (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS outcomes (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS not_upheld_reasons (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS providers (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issues (
  id INTEGER PRIMARY KEY,
  sector_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  code TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
  id INTEGER PRIMARY KEY,
  sector_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  code TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS decisions (
  decision_id INTEGER PRIMARY KEY,
  case_reference_number TEXT NOT NULL,
  complaint_id INTEGER NOT NULL,
  sector_id INTEGER NOT NULL,
  issue_id INTEGER NOT NULL,
  product_id INTEGER NOT NULL,
  outcome_id INTEGER NOT NULL,
  not_upheld_reason_id INTEGER,
  provider_ids_json TEXT NOT NULL,
  year_of_decision INTEGER NOT NULL,
  published_date INTEGER NOT NULL,
  published INTEGER NOT NULL CHECK (published IN (0, 1)),
  court_appeal INTEGER NOT NULL CHECK (court_appeal IN (0, 1)),
  language TEXT NOT NULL,
  complainant TEXT NOT NULL,
  file_path TEXT NOT NULL,
  file_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS decision_providers (
  decision_provider_id INTEGER PRIMARY KEY,
  decision_id INTEGER NOT NULL,
  provider_id INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS complaint_classifications (
  id INTEGER PRIMARY KEY,
  complaint_id INTEGER NOT NULL,
  closure_date INTEGER
);

CREATE TABLE IF NOT EXISTS enquiries (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  uid TEXT NOT NULL UNIQUE,
  title_id TEXT NOT NULL,
  name TEXT NOT NULL,
  surname TEXT NOT NULL,
  contact_number TEXT NOT NULL,
  email TEXT NOT NULL,
  country TEXT NOT NULL,
  sector TEXT NOT NULL,
  sector_other TEXT,
  enquiry TEXT NOT NULL,
  status TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS enquiry_files (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  enquiry_uid TEXT NOT NULL,
  filename TEXT NOT NULL,
  filesize INTEGER NOT NULL,
  mimetype TEXT NOT NULL,
  description TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  FOREIGN KEY (enquiry_uid) REFERENCES enquiries(uid)
);

CREATE TABLE IF NOT EXISTS complaints (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id INTEGER NOT NULL,
  status_id INTEGER NOT NULL CHECK (status_id IN (1, 2)),
  complainant_type_id INTEGER NOT NULL,
  language TEXT NOT NULL,
  complaint_section INTEGER NOT NULL CHECK (complaint_section >= 1),
  date_created INTEGER NOT NULL,
  date_updated INTEGER NOT NULL,
  date_originated INTEGER,
  complaint_uid TEXT UNIQUE,
  individual_json TEXT NOT NULL,
  company_json TEXT NOT NULL,
  assistant_json TEXT NOT NULL,
  service_provider_json TEXT NOT NULL,
  details_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS directors (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  complaint_id INTEGER NOT NULL,
  first_name TEXT NOT NULL,
  last_name TEXT NOT NULL,
  email TEXT NOT NULL,
  role TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sequence_counters (
  collection TEXT PRIMARY KEY,
  last_value INTEGER NOT NULL CHECK (last_value >= 0)
);

CREATE INDEX IF NOT EXISTS idx_decisions_published ON decisions(published);
CREATE INDEX IF NOT EXISTS idx_decisions_sector ON decisions(sector_id);
CREATE INDEX IF NOT EXISTS idx_decision_providers_decision ON decision_providers(decision_id);
CREATE INDEX IF NOT EXISTS idx_classifications_complaint ON complaint_classifications(complaint_id);
CREATE INDEX IF NOT EXISTS idx_issues_sector ON issues(sector_id);
CREATE INDEX IF NOT EXISTS idx_products_sector ON products(sector_id);
CREATE INDEX IF NOT EXISTS idx_enquiry_files_uid ON enquiry_files(enquiry_uid);
CREATE INDEX IF NOT EXISTS idx_complaints_user ON complaints(user_id);
CREATE INDEX IF NOT EXISTS idx_directors_complaint ON directors(complaint_id);
";

/// Collections backed by a persisted sequence counter. The counter is seeded
/// from the collection's current row count on first use, so identifiers
/// survive restarts without ever falling below the true count.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SequenceCollection {
    Enquiries,
    Complaints,
}

impl SequenceCollection {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Enquiries => "enquiries",
            Self::Complaints => "complaints",
        }
    }

    fn count_sql(self) -> &'static str {
        match self {
            Self::Enquiries => "SELECT COUNT(*) FROM enquiries",
            Self::Complaints => "SELECT COUNT(*) FROM complaints",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a SQLite-backed record store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot
    /// be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step
    /// fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let version = current_schema_version(&self.conn)?;
        if version < 1 {
            let tx = self
                .conn
                .transaction()
                .context("failed to start migration transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
            tx.execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![1_i64, now_rfc3339()?],
            )
            .context("failed to record migration version 1")?;
            tx.commit().context("failed to commit migration v1")?;
        }

        Ok(())
    }

    /// Reserve the next identifier number for `collection`.
    ///
    /// The read-seed-increment sequence runs inside one IMMEDIATE
    /// transaction, so concurrent generators for the same collection are
    /// serialized by the database's writer lock and can never observe the
    /// same value. Reserved numbers are never handed out twice, even when
    /// the caller's subsequent insert fails.
    ///
    /// # Errors
    /// Returns an error when the counter cannot be read or advanced.
    pub fn next_sequence(&mut self, collection: SequenceCollection) -> Result<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start sequence transaction")?;
        let value = bump_sequence(&tx, collection)?;
        tx.commit().context("failed to commit sequence transaction")?;
        Ok(value)
    }

    /// Preview the identifier number the next reservation would return,
    /// without reserving it.
    ///
    /// # Errors
    /// Returns an error when the counter cannot be read.
    pub fn peek_sequence(&self, collection: SequenceCollection) -> Result<i64> {
        let current = read_sequence(&self.conn, collection)?;
        Ok(current + 1)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_sector(&mut self, sector: &Sector) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sectors(id, name) VALUES (?1, ?2)",
                params![sector.id, sector.name],
            )
            .context("failed to insert sector")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_sectors(&self) -> Result<Vec<Sector>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM sectors ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok(Sector { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_outcome(&mut self, outcome: &Outcome) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO outcomes(id, name) VALUES (?1, ?2)",
                params![outcome.id, outcome.name],
            )
            .context("failed to insert outcome")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_outcomes(&self) -> Result<Vec<Outcome>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM outcomes ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok(Outcome { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_not_upheld_reason(&mut self, reason: &NotUpheldReason) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO not_upheld_reasons(id, name) VALUES (?1, ?2)",
                params![reason.id, reason.name],
            )
            .context("failed to insert not-upheld reason")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_not_upheld_reasons(&self) -> Result<Vec<NotUpheldReason>> {
        let mut stmt =
            self.conn.prepare("SELECT id, name FROM not_upheld_reasons ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok(NotUpheldReason { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_provider(&mut self, provider: &Provider) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO providers(id, name) VALUES (?1, ?2)",
                params![provider.id, provider.name],
            )
            .context("failed to insert provider")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_providers(&self) -> Result<Vec<Provider>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM providers ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| Ok(Provider { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_issue(&mut self, issue: &Issue) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO issues(id, sector_id, name, code) VALUES (?1, ?2, ?3, ?4)",
                params![issue.id, issue.sector_id, issue.name, issue.code],
            )
            .context("failed to insert issue")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_issues(&self) -> Result<Vec<Issue>> {
        self.query_issues("SELECT id, sector_id, name, code FROM issues ORDER BY id ASC", &[])
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_issues_for_sector(&self, sector_id: i64) -> Result<Vec<Issue>> {
        self.query_issues(
            "SELECT id, sector_id, name, code FROM issues WHERE sector_id = ?1 ORDER BY id ASC",
            &[&sector_id as &dyn rusqlite::ToSql],
        )
    }

    fn query_issues(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Issue>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(Issue {
                    id: row.get(0)?,
                    sector_id: row.get(1)?,
                    name: row.get(2)?,
                    code: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO products(id, sector_id, name, code) VALUES (?1, ?2, ?3, ?4)",
                params![product.id, product.sector_id, product.name, product.code],
            )
            .context("failed to insert product")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_products(&self) -> Result<Vec<Product>> {
        self.query_products("SELECT id, sector_id, name, code FROM products ORDER BY id ASC", &[])
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_products_for_sector(&self, sector_id: i64) -> Result<Vec<Product>> {
        self.query_products(
            "SELECT id, sector_id, name, code FROM products WHERE sector_id = ?1 ORDER BY id ASC",
            &[&sector_id as &dyn rusqlite::ToSql],
        )
    }

    fn query_products(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(Product {
                    id: row.get(0)?,
                    sector_id: row.get(1)?,
                    name: row.get(2)?,
                    code: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_decision_provider(&mut self, link: &DecisionProvider) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO decision_providers(decision_provider_id, decision_id, provider_id)
                 VALUES (?1, ?2, ?3)",
                params![link.decision_provider_id, link.decision_id, link.provider_id],
            )
            .context("failed to insert decision provider link")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_decision_providers(&self) -> Result<Vec<DecisionProvider>> {
        let mut stmt = self.conn.prepare(
            "SELECT decision_provider_id, decision_id, provider_id
             FROM decision_providers ORDER BY decision_provider_id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DecisionProvider {
                    decision_provider_id: row.get(0)?,
                    decision_id: row.get(1)?,
                    provider_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_classification(&mut self, classification: &ComplaintClassification) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO complaint_classifications(id, complaint_id, closure_date)
                 VALUES (?1, ?2, ?3)",
                params![
                    classification.id,
                    classification.complaint_id,
                    classification.closure_date
                ],
            )
            .context("failed to insert complaint classification")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_classifications(&self) -> Result<Vec<ComplaintClassification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, complaint_id, closure_date FROM complaint_classifications ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ComplaintClassification {
                    id: row.get(0)?,
                    complaint_id: row.get(1)?,
                    closure_date: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// # Errors
    /// Returns an error when serialization or the insert fails.
    pub fn insert_decision(&mut self, decision: &Decision) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO decisions(
                    decision_id, case_reference_number, complaint_id, sector_id, issue_id,
                    product_id, outcome_id, not_upheld_reason_id, provider_ids_json,
                    year_of_decision, published_date, published, court_appeal,
                    language, complainant, file_path, file_id
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5,
                    ?6, ?7, ?8, ?9,
                    ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17
                )",
                params![
                    decision.decision_id,
                    decision.case_reference_number,
                    decision.complaint_id,
                    decision.sector_id,
                    decision.issue_id,
                    decision.product_id,
                    decision.outcome_id,
                    decision.not_upheld_reason_id,
                    serde_json::to_string(&decision.provider_ids)
                        .context("failed to serialize provider ids")?,
                    decision.year_of_decision,
                    decision.published_date,
                    decision.published,
                    decision.court_appeal,
                    decision.language,
                    decision.complainant,
                    decision.file_path,
                    decision.file_id,
                ],
            )
            .context("failed to insert decision")?;
        Ok(())
    }

    /// Scan the full decisions collection.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_decisions(&self) -> Result<Vec<Decision>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                decision_id, case_reference_number, complaint_id, sector_id, issue_id,
                product_id, outcome_id, not_upheld_reason_id, provider_ids_json,
                year_of_decision, published_date, published, court_appeal,
                language, complainant, file_path, file_id
             FROM decisions
             ORDER BY decision_id ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut decisions = Vec::new();
        while let Some(row) = rows.next()? {
            let provider_ids_json: String = row.get(8)?;
            decisions.push(Decision {
                decision_id: row.get(0)?,
                case_reference_number: row.get(1)?,
                complaint_id: row.get(2)?,
                sector_id: row.get(3)?,
                issue_id: row.get(4)?,
                product_id: row.get(5)?,
                outcome_id: row.get(6)?,
                not_upheld_reason_id: row.get(7)?,
                provider_ids: serde_json::from_str(&provider_ids_json)
                    .context("failed to deserialize provider ids")?,
                year_of_decision: row.get(9)?,
                published_date: row.get(10)?,
                published: row.get(11)?,
                court_appeal: row.get(12)?,
                language: row.get(13)?,
                complainant: row.get(14)?,
                file_path: row.get(15)?,
                file_id: row.get(16)?,
            });
        }
        Ok(decisions)
    }

    /// Seed-path insert of a fully formed enquiry. Does not touch the
    /// sequence counter; the counter seeds itself from the row count on
    /// first reservation.
    ///
    /// # Errors
    /// Returns an error when the insert fails.
    pub fn insert_enquiry(&mut self, enquiry: &Enquiry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO enquiries(
                    id, uid, title_id, name, surname, contact_number, email, country,
                    sector, sector_other, enquiry, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    enquiry.id,
                    enquiry.uid,
                    enquiry.title_id,
                    enquiry.name,
                    enquiry.surname,
                    enquiry.contact_number,
                    enquiry.email,
                    enquiry.country,
                    enquiry.sector,
                    enquiry.sector_other,
                    enquiry.enquiry,
                    enquiry.status,
                    enquiry.created_at,
                ],
            )
            .context("failed to insert enquiry")?;
        Ok(())
    }

    /// Validate an enquiry submission, reserve its uid and persist it — all
    /// in one transaction so concurrent submissions cannot share a uid.
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] for rejected drafts, or a
    /// storage error when persistence fails.
    pub fn create_enquiry(&mut self, draft: &EnquiryDraft) -> Result<Enquiry> {
        draft.validate().map_err(anyhow::Error::from)?;

        let now = OffsetDateTime::now_utc();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start enquiry transaction")?;

        let sequence = bump_sequence(&tx, SequenceCollection::Enquiries)?;
        let uid = format_enquiry_uid(now.year(), sequence);
        tx.execute(
            "INSERT INTO enquiries(
                uid, title_id, name, surname, contact_number, email, country,
                sector, sector_other, enquiry, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                uid,
                draft.title_id,
                draft.name,
                draft.surname,
                draft.contact_number,
                draft.email,
                draft.country,
                draft.sector,
                draft.sector_other,
                draft.enquiry,
                ENQUIRY_STATUS_OPEN,
                now.unix_timestamp(),
            ],
        )
        .context("failed to insert enquiry")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("failed to commit enquiry transaction")?;

        Ok(Enquiry {
            id,
            uid,
            title_id: draft.title_id.clone(),
            name: draft.name.clone(),
            surname: draft.surname.clone(),
            contact_number: draft.contact_number.clone(),
            email: draft.email.clone(),
            country: draft.country.clone(),
            sector: draft.sector.clone(),
            sector_other: draft.sector_other.clone(),
            enquiry: draft.enquiry.clone(),
            status: ENQUIRY_STATUS_OPEN.to_string(),
            created_at: now.unix_timestamp(),
        })
    }

    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn get_enquiry(&self, uid: &str) -> Result<Option<Enquiry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uid, title_id, name, surname, contact_number, email, country,
                    sector, sector_other, enquiry, status, created_at
             FROM enquiries WHERE uid = ?1",
        )?;
        let enquiry = stmt.query_row(params![uid], enquiry_from_row).optional()?;
        Ok(enquiry)
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_enquiries(&self, email: Option<&str>) -> Result<Vec<Enquiry>> {
        let sql_all = "SELECT id, uid, title_id, name, surname, contact_number, email, country,
                    sector, sector_other, enquiry, status, created_at
             FROM enquiries ORDER BY id ASC";
        let sql_by_email = "SELECT id, uid, title_id, name, surname, contact_number, email, country,
                    sector, sector_other, enquiry, status, created_at
             FROM enquiries WHERE email = ?1 ORDER BY id ASC";

        let mut enquiries = Vec::new();
        match email {
            Some(email) => {
                let mut stmt = self.conn.prepare(sql_by_email)?;
                let mut rows = stmt.query(params![email])?;
                while let Some(row) = rows.next()? {
                    enquiries.push(enquiry_from_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(sql_all)?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    enquiries.push(enquiry_from_row(row)?);
                }
            }
        }
        Ok(enquiries)
    }

    /// Attach one file record to an existing enquiry.
    ///
    /// # Errors
    /// Returns [`RegisterError::NotFound`] when the enquiry uid is unknown,
    /// or a storage error when the insert fails.
    pub fn add_enquiry_file(&mut self, uid: &str, draft: &EnquiryFileDraft) -> Result<EnquiryFile> {
        if self.get_enquiry(uid)?.is_none() {
            return Err(RegisterError::not_found("enquiry").into());
        }

        let now = now_epoch();
        self.conn
            .execute(
                "INSERT INTO enquiry_files(
                    enquiry_uid, filename, filesize, mimetype, description, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![uid, draft.filename, draft.filesize, draft.mimetype, draft.description, now],
            )
            .context("failed to insert enquiry file")?;

        Ok(EnquiryFile {
            id: self.conn.last_insert_rowid(),
            enquiry_uid: uid.to_string(),
            filename: draft.filename.clone(),
            filesize: draft.filesize,
            mimetype: draft.mimetype.clone(),
            description: draft.description.clone(),
            created_at: now,
        })
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_enquiry_files(&self, uid: &str) -> Result<Vec<EnquiryFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, enquiry_uid, filename, filesize, mimetype, description, created_at
             FROM enquiry_files WHERE enquiry_uid = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![uid], |row| {
                Ok(EnquiryFile {
                    id: row.get(0)?,
                    enquiry_uid: row.get(1)?,
                    filename: row.get(2)?,
                    filesize: row.get(3)?,
                    mimetype: row.get(4)?,
                    description: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Open a Draft complaint with all section payloads in their empty
    /// shapes.
    ///
    /// # Errors
    /// Returns an error when serialization or the insert fails.
    pub fn create_complaint(
        &mut self,
        user_id: i64,
        complainant_type_id: i64,
        language: &str,
    ) -> Result<Complaint> {
        let now = now_epoch();
        let mut complaint = Complaint::new(0, user_id, complainant_type_id, language.to_string(), now);

        self.conn
            .execute(
                "INSERT INTO complaints(
                    user_id, status_id, complainant_type_id, language, complaint_section,
                    date_created, date_updated, date_originated, complaint_uid,
                    individual_json, company_json, assistant_json, service_provider_json,
                    details_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    complaint.user_id,
                    complaint.status.status_id(),
                    complaint.complainant_type_id,
                    complaint.language,
                    i64::from(complaint.complaint_section),
                    complaint.date_created,
                    complaint.date_updated,
                    complaint.date_originated,
                    complaint.complaint_uid,
                    section_json(&complaint.individual)?,
                    section_json(&complaint.company)?,
                    section_json(&complaint.assistant)?,
                    section_json(&complaint.service_provider)?,
                    section_json(&complaint.details)?,
                ],
            )
            .context("failed to insert complaint")?;

        complaint.id = self.conn.last_insert_rowid();
        Ok(complaint)
    }

    /// # Errors
    /// Returns an error when the lookup fails or stored JSON is corrupt.
    pub fn get_complaint(&self, complaint_id: i64) -> Result<Option<Complaint>> {
        load_complaint(&self.conn, complaint_id)
    }

    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_complaints_for_user(&self, user_id: i64) -> Result<Vec<Complaint>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, status_id, complainant_type_id, language, complaint_section,
                    date_created, date_updated, date_originated, complaint_uid,
                    individual_json, company_json, assistant_json, service_provider_json,
                    details_json
             FROM complaints WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let mut rows = stmt.query(params![user_id])?;
        let mut complaints = Vec::new();
        while let Some(row) = rows.next()? {
            complaints.push(complaint_from_row(row)?);
        }
        Ok(complaints)
    }

    /// Shallow-merge `payload` into one section of a Draft complaint.
    ///
    /// The load-merge-write runs inside one IMMEDIATE transaction and only
    /// the named section column is written, so concurrent updates to
    /// different sections of the same complaint cannot lose each other's
    /// writes.
    ///
    /// # Errors
    /// Returns [`RegisterError::NotFound`] for unknown complaint ids,
    /// [`RegisterError::InvalidSection`] for unknown section numbers,
    /// [`RegisterError::AlreadySubmitted`] after finalization, or a storage
    /// error when persistence fails.
    pub fn update_complaint_section(
        &mut self,
        complaint_id: i64,
        section_number: u8,
        payload: &SectionPayload,
    ) -> Result<Complaint> {
        let now = now_epoch();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start section update transaction")?;

        let mut complaint = load_complaint(&tx, complaint_id)?
            .ok_or_else(|| anyhow::Error::from(RegisterError::not_found("complaint")))?;
        let section = ComplaintSection::from_number(section_number)
            .ok_or_else(|| anyhow::Error::from(RegisterError::InvalidSection(section_number)))?;

        complaint.apply_section_update(section, payload, now).map_err(anyhow::Error::from)?;

        let sql = format!(
            "UPDATE complaints SET {}_json = ?1, complaint_section = ?2, date_updated = ?3 WHERE id = ?4",
            section.key()
        );
        tx.execute(
            &sql,
            params![
                section_json(complaint.section(section))?,
                i64::from(complaint.complaint_section),
                complaint.date_updated,
                complaint_id,
            ],
        )
        .context("failed to update complaint section")?;
        tx.commit().context("failed to commit section update transaction")?;

        Ok(complaint)
    }

    /// Finalize a complaint: reserve the next reference number, stamp the
    /// Submitted state and return the reference. Submitting an already
    /// Submitted complaint returns its existing reference without consuming
    /// a sequence number. Reservation and stamping share one transaction.
    ///
    /// # Errors
    /// Returns [`RegisterError::NotFound`] for unknown complaint ids, or a
    /// storage error when persistence fails.
    pub fn submit_complaint(&mut self, complaint_id: i64) -> Result<SubmitReceipt> {
        let now = OffsetDateTime::now_utc();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start submit transaction")?;

        let mut complaint = load_complaint(&tx, complaint_id)?
            .ok_or_else(|| anyhow::Error::from(RegisterError::not_found("complaint")))?;

        if let Some(existing) = complaint.complaint_uid.clone() {
            tx.commit().context("failed to commit submit transaction")?;
            return Ok(SubmitReceipt {
                complaint_id: complaint.id,
                reference: existing,
                already_submitted: true,
            });
        }

        let sequence = bump_sequence(&tx, SequenceCollection::Complaints)?;
        let reference = format_complaint_reference(sequence, now.year());
        let receipt = complaint.finalize(reference, now.unix_timestamp());

        tx.execute(
            "UPDATE complaints SET status_id = ?1, complaint_uid = ?2, date_originated = ?3
             WHERE id = ?4",
            params![
                complaint.status.status_id(),
                complaint.complaint_uid,
                complaint.date_originated,
                complaint_id,
            ],
        )
        .context("failed to finalize complaint")?;
        tx.commit().context("failed to commit submit transaction")?;

        Ok(receipt)
    }

    /// # Errors
    /// Returns [`RegisterError::Validation`] for rejected drafts, or a
    /// storage error when the insert fails.
    pub fn create_director(&mut self, draft: &DirectorDraft) -> Result<Director> {
        draft.validate().map_err(anyhow::Error::from)?;
        let complaint_id = draft
            .complaint_id
            .ok_or_else(|| anyhow!("director draft passed validation without complaint_id"))?;

        let now = now_epoch();
        let email = draft.email.clone().unwrap_or_default();
        let role = draft.role.clone().unwrap_or_else(|| DEFAULT_DIRECTOR_ROLE.to_string());
        self.conn
            .execute(
                "INSERT INTO directors(
                    complaint_id, first_name, last_name, email, role, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![complaint_id, draft.first_name, draft.last_name, email, role, now],
            )
            .context("failed to insert director")?;

        Ok(Director {
            id: self.conn.last_insert_rowid(),
            complaint_id,
            first_name: draft.first_name.clone(),
            last_name: draft.last_name.clone(),
            email,
            role,
            created_at: now,
        })
    }

    /// # Errors
    /// Returns an error when rows cannot be read.
    pub fn list_directors(&self, complaint_id: Option<i64>) -> Result<Vec<Director>> {
        let mut directors = Vec::new();
        match complaint_id {
            Some(complaint_id) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, complaint_id, first_name, last_name, email, role, created_at
                     FROM directors WHERE complaint_id = ?1 ORDER BY id ASC",
                )?;
                let mut rows = stmt.query(params![complaint_id])?;
                while let Some(row) = rows.next()? {
                    directors.push(director_from_row(row)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, complaint_id, first_name, last_name, email, role, created_at
                     FROM directors ORDER BY id ASC",
                )?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    directors.push(director_from_row(row)?);
                }
            }
        }
        Ok(directors)
    }

    /// # Errors
    /// Returns an error when the lookup fails.
    pub fn get_director(&self, director_id: i64) -> Result<Option<Director>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, complaint_id, first_name, last_name, email, role, created_at
             FROM directors WHERE id = ?1",
        )?;
        let director = stmt.query_row(params![director_id], director_from_row).optional()?;
        Ok(director)
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] when no such director exists, or
    /// a storage error when the delete fails.
    pub fn delete_director(&mut self, director_id: i64) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM directors WHERE id = ?1", params![director_id])
            .context("failed to delete director")?;
        if removed == 0 {
            return Err(RegisterError::not_found("director").into());
        }
        Ok(())
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .context("failed to read schema version")?;
    Ok(version)
}

fn read_sequence(conn: &Connection, collection: SequenceCollection) -> Result<i64> {
    let stored: Option<i64> = conn
        .query_row(
            "SELECT last_value FROM sequence_counters WHERE collection = ?1",
            params![collection.name()],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read sequence counter")?;

    match stored {
        Some(value) => Ok(value),
        None => conn
            .query_row(collection.count_sql(), [], |row| row.get(0))
            .context("failed to count collection rows"),
    }
}

fn bump_sequence(conn: &Connection, collection: SequenceCollection) -> Result<i64> {
    let next = read_sequence(conn, collection)? + 1;
    conn.execute(
        "INSERT INTO sequence_counters(collection, last_value) VALUES (?1, ?2)
         ON CONFLICT(collection) DO UPDATE SET last_value = excluded.last_value",
        params![collection.name(), next],
    )
    .context("failed to advance sequence counter")?;
    Ok(next)
}

fn section_json(section: &SectionPayload) -> Result<String> {
    serde_json::to_string(section).context("failed to serialize section payload")
}

fn parse_section(json: &str) -> Result<SectionPayload> {
    serde_json::from_str(json).context("failed to deserialize section payload")
}

fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format timestamp")
}

fn enquiry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Enquiry> {
    Ok(Enquiry {
        id: row.get(0)?,
        uid: row.get(1)?,
        title_id: row.get(2)?,
        name: row.get(3)?,
        surname: row.get(4)?,
        contact_number: row.get(5)?,
        email: row.get(6)?,
        country: row.get(7)?,
        sector: row.get(8)?,
        sector_other: row.get(9)?,
        enquiry: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn director_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Director> {
    Ok(Director {
        id: row.get(0)?,
        complaint_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        role: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn complaint_from_row(row: &rusqlite::Row<'_>) -> Result<Complaint> {
    let status_id: i64 = row.get(2)?;
    let status = ComplaintStatus::parse(status_id)
        .ok_or_else(|| anyhow!("unknown status_id: {status_id}"))?;

    let individual_json: String = row.get(10)?;
    let company_json: String = row.get(11)?;
    let assistant_json: String = row.get(12)?;
    let service_provider_json: String = row.get(13)?;
    let details_json: String = row.get(14)?;

    Ok(Complaint {
        id: row.get(0)?,
        user_id: row.get(1)?,
        status,
        complainant_type_id: row.get(3)?,
        language: row.get(4)?,
        complaint_section: row.get(5)?,
        date_created: row.get(6)?,
        date_updated: row.get(7)?,
        date_originated: row.get(8)?,
        complaint_uid: row.get(9)?,
        individual: parse_section(&individual_json)?,
        company: parse_section(&company_json)?,
        assistant: parse_section(&assistant_json)?,
        service_provider: parse_section(&service_provider_json)?,
        details: parse_section(&details_json)?,
    })
}

fn load_complaint(conn: &Connection, complaint_id: i64) -> Result<Option<Complaint>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, status_id, complainant_type_id, language, complaint_section,
                date_created, date_updated, date_originated, complaint_uid,
                individual_json, company_json, assistant_json, service_provider_json,
                details_json
         FROM complaints WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![complaint_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(complaint_from_row(row)?)),
        None => Ok(None),
    }
}
