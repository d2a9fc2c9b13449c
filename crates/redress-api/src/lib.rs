use std::path::PathBuf;

use anyhow::Result;
use redress_core::{
    format_enquiry_uid, query_decisions, Complaint, ComplaintClassification, Decision,
    DecisionFilters, DecisionProvider, DecisionQueryPage, Director, DirectorDraft, Enquiry,
    EnquiryDraft, EnquiryFile, EnquiryFileDraft, FieldErrors, Issue, NotUpheldReason, Outcome,
    PageRequest, Product, Provider, ReferenceIndex, RegisterError, SectionPayload, Sector,
    SubmitReceipt, DEFAULT_LANGUAGE, DEFAULT_PAGE_LIMIT, DIRECTOR_REDIRECT_SECTION,
};
use redress_store_sqlite::{SchemaStatus, SequenceCollection, SqliteStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

/// Decision facet parameters exactly as they arrive from the query string.
/// Numeric facets are coerced here; a non-numeric value is a per-field
/// validation error rather than a silently never-matching comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionQueryParams {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub case_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionFilterOptions {
    pub sectors: Vec<Sector>,
    pub outcomes: Vec<Outcome>,
    pub reasons: Vec<NotUpheldReason>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitComplaintRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub complainant_type_id: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectorCreated {
    pub director_id: i64,
    pub redirect_section: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextUid {
    pub uid: String,
}

/// Fixture-shaped bundle of records loaded into the store in one call, used
/// by the CLI seed command and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedData {
    #[serde(default)]
    pub sectors: Vec<Sector>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
    #[serde(default)]
    pub not_upheld_reasons: Vec<NotUpheldReason>,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub decision_providers: Vec<DecisionProvider>,
    #[serde(default)]
    pub complaint_classifications: Vec<ComplaintClassification>,
    #[serde(default)]
    pub enquiries: Vec<Enquiry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub reference_records: usize,
    pub decisions: usize,
    pub enquiries: usize,
}

fn parse_number<T>(value: Option<&str>, field: &str, errors: &mut FieldErrors) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = value.map(str::trim).filter(|raw| !raw.is_empty())?;
    match raw.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.insert(field.to_string(), format!("{field} must be a number"));
            None
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.cloned().filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct RedressApi {
    db_path: PathBuf,
}

impl RedressApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Load a bundle of seed records into the store.
    ///
    /// # Errors
    /// Returns an error when any insert fails.
    pub fn seed(&self, data: &SeedData) -> Result<SeedSummary> {
        let mut store = self.open_store()?;
        store.migrate()?;

        for sector in &data.sectors {
            store.insert_sector(sector)?;
        }
        for issue in &data.issues {
            store.insert_issue(issue)?;
        }
        for product in &data.products {
            store.insert_product(product)?;
        }
        for outcome in &data.outcomes {
            store.insert_outcome(outcome)?;
        }
        for reason in &data.not_upheld_reasons {
            store.insert_not_upheld_reason(reason)?;
        }
        for provider in &data.providers {
            store.insert_provider(provider)?;
        }
        for link in &data.decision_providers {
            store.insert_decision_provider(link)?;
        }
        for classification in &data.complaint_classifications {
            store.insert_classification(classification)?;
        }
        for decision in &data.decisions {
            store.insert_decision(decision)?;
        }
        for enquiry in &data.enquiries {
            store.insert_enquiry(enquiry)?;
        }

        Ok(SeedSummary {
            reference_records: data.sectors.len()
                + data.issues.len()
                + data.products.len()
                + data.outcomes.len()
                + data.not_upheld_reasons.len()
                + data.providers.len()
                + data.decision_providers.len()
                + data.complaint_classifications.len(),
            decisions: data.decisions.len(),
            enquiries: data.enquiries.len(),
        })
    }

    /// Run the faceted decisions query over the published collection.
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] when a numeric facet parameter
    /// does not parse, or a storage error when reads fail.
    pub fn query_decisions(&self, params: &DecisionQueryParams) -> Result<DecisionQueryPage> {
        let mut errors = FieldErrors::new();
        let page_number = parse_number::<u64>(params.page.as_deref(), "page", &mut errors);
        let limit = parse_number::<u64>(params.limit.as_deref(), "limit", &mut errors);
        let filters = DecisionFilters {
            year: parse_number(params.year.as_deref(), "year", &mut errors),
            outcome_id: parse_number(params.outcome.as_deref(), "outcome", &mut errors),
            sector_id: parse_number(params.sector.as_deref(), "sector", &mut errors),
            issue_id: parse_number(params.issue.as_deref(), "issue", &mut errors),
            product_id: parse_number(params.product.as_deref(), "product", &mut errors),
            provider_id: parse_number(params.provider.as_deref(), "provider", &mut errors),
            language: non_empty(params.language.as_ref()),
            case_reference: non_empty(params.case_reference.as_ref()),
        };
        if !errors.is_empty() {
            return Err(RegisterError::Validation(errors).into());
        }
        let page = PageRequest::new(page_number.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_LIMIT));

        let mut store = self.open_store()?;
        store.migrate()?;

        let decisions = store.list_decisions()?;
        let sectors = store.list_sectors()?;
        let issues = store.list_issues()?;
        let products = store.list_products()?;
        let outcomes = store.list_outcomes()?;
        let providers = store.list_providers()?;
        let decision_providers = store.list_decision_providers()?;
        let classifications = store.list_classifications()?;

        let index = ReferenceIndex::build(
            &sectors,
            &issues,
            &products,
            &outcomes,
            &providers,
            &decision_providers,
            &classifications,
        );
        Ok(query_decisions(&decisions, &index, &filters, page))
    }

    /// Reference tables backing the decisions filter UI.
    ///
    /// # Errors
    /// Returns an error when reads fail.
    pub fn decision_filter_options(&self) -> Result<DecisionFilterOptions> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(DecisionFilterOptions {
            sectors: store.list_sectors()?,
            outcomes: store.list_outcomes()?,
            reasons: store.list_not_upheld_reasons()?,
        })
    }

    /// # Errors
    /// Returns an error when reads fail.
    pub fn issues_for_sector(&self, sector_id: i64) -> Result<Vec<Issue>> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.list_issues_for_sector(sector_id)
    }

    /// # Errors
    /// Returns an error when reads fail.
    pub fn products_for_sector(&self, sector_id: i64) -> Result<Vec<Product>> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.list_products_for_sector(sector_id)
    }

    /// Preview the uid the next enquiry submission would receive, without
    /// reserving it.
    ///
    /// # Errors
    /// Returns an error when the counter cannot be read.
    pub fn next_enquiry_uid(&self) -> Result<NextUid> {
        let mut store = self.open_store()?;
        store.migrate()?;
        let sequence = store.peek_sequence(SequenceCollection::Enquiries)?;
        Ok(NextUid { uid: format_enquiry_uid(OffsetDateTime::now_utc().year(), sequence) })
    }

    /// Validate and persist one enquiry, assigning its uid.
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] for rejected drafts, or a
    /// storage error when persistence fails.
    pub fn create_enquiry(&self, draft: &EnquiryDraft) -> Result<Enquiry> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.create_enquiry(draft)
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] when the uid is unknown.
    pub fn get_enquiry(&self, uid: &str) -> Result<Enquiry> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.get_enquiry(uid)?.ok_or_else(|| RegisterError::not_found("enquiry").into())
    }

    /// # Errors
    /// Returns an error when reads fail.
    pub fn list_enquiries(&self, email: Option<&str>) -> Result<Vec<Enquiry>> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.list_enquiries(email)
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] when the uid is unknown, or a
    /// storage error when the insert fails.
    pub fn attach_enquiry_file(&self, uid: &str, draft: &EnquiryFileDraft) -> Result<EnquiryFile> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.add_enquiry_file(uid, draft)
    }

    /// # Errors
    /// Returns an error when reads fail.
    pub fn list_enquiry_files(&self, uid: &str) -> Result<Vec<EnquiryFile>> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.list_enquiry_files(uid)
    }

    /// Open a Draft complaint. `complainant_type_id` is the only required
    /// field; `user_id` defaults to 0 and `language` to "en".
    ///
    /// # Errors
    /// Returns [`RegisterError::Validation`] when `complainant_type_id` is
    /// absent, or a storage error when persistence fails.
    pub fn init_complaint(&self, request: &InitComplaintRequest) -> Result<Complaint> {
        let Some(complainant_type_id) = request.complainant_type_id else {
            return Err(RegisterError::validation("complainant_type_id", "Type is required").into());
        };

        let mut store = self.open_store()?;
        store.migrate()?;
        store.create_complaint(
            request.user_id.unwrap_or(0),
            complainant_type_id,
            request.language.as_deref().unwrap_or(DEFAULT_LANGUAGE),
        )
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`], [`RegisterError::InvalidSection`]
    /// or [`RegisterError::AlreadySubmitted`] per the workflow rules, or a
    /// storage error when persistence fails.
    pub fn update_complaint_section(
        &self,
        complaint_id: i64,
        section_number: u8,
        payload: &SectionPayload,
    ) -> Result<Complaint> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.update_complaint_section(complaint_id, section_number, payload)
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] for unknown complaint ids, or a
    /// storage error when persistence fails.
    pub fn submit_complaint(&self, complaint_id: i64) -> Result<SubmitReceipt> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.submit_complaint(complaint_id)
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] when the id is unknown.
    pub fn get_complaint(&self, complaint_id: i64) -> Result<Complaint> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store
            .get_complaint(complaint_id)?
            .ok_or_else(|| RegisterError::not_found("complaint").into())
    }

    /// # Errors
    /// Returns an error when reads fail.
    pub fn complaints_for_user(&self, user_id: i64) -> Result<Vec<Complaint>> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.list_complaints_for_user(user_id)
    }

    /// # Errors
    /// Returns [`RegisterError::Validation`] for rejected drafts, or a
    /// storage error when the insert fails.
    pub fn create_director(&self, draft: &DirectorDraft) -> Result<DirectorCreated> {
        let mut store = self.open_store()?;
        store.migrate()?;
        let director = store.create_director(draft)?;
        Ok(DirectorCreated {
            director_id: director.id,
            redirect_section: DIRECTOR_REDIRECT_SECTION,
        })
    }

    /// # Errors
    /// Returns an error when reads fail.
    pub fn list_directors(&self, complaint_id: Option<i64>) -> Result<Vec<Director>> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.list_directors(complaint_id)
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] when the id is unknown.
    pub fn get_director(&self, director_id: i64) -> Result<Director> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store
            .get_director(director_id)?
            .ok_or_else(|| RegisterError::not_found("director").into())
    }

    /// # Errors
    /// Returns [`RegisterError::NotFound`] when the id is unknown, or a
    /// storage error when the delete fails.
    pub fn delete_director(&self, director_id: i64) -> Result<()> {
        let mut store = self.open_store()?;
        store.migrate()?;
        store.delete_director(director_id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn unique_temp_db_path() -> PathBuf {
        std::env::temp_dir().join(format!("redress-api-{}.sqlite3", ulid::Ulid::new()))
    }

    fn mk_decision(decision_id: i64, sector_id: i64, provider_ids: Vec<i64>) -> Decision {
        Decision {
            decision_id,
            case_reference_number: format!("CASE/{decision_id}"),
            complaint_id: decision_id + 1_000,
            sector_id,
            issue_id: 10,
            product_id: 20,
            outcome_id: 30,
            not_upheld_reason_id: None,
            provider_ids,
            year_of_decision: 1_700_000_000,
            published_date: 1_700_000_000,
            published: true,
            court_appeal: false,
            language: "en".to_string(),
            complainant: "Individual".to_string(),
            file_path: format!("/decisions/{decision_id}.pdf"),
            file_id: decision_id + 5_000,
        }
    }

    fn sample_seed() -> SeedData {
        SeedData {
            sectors: vec![
                Sector { id: 1, name: "Banking".to_string() },
                Sector { id: 2, name: "Insurance".to_string() },
            ],
            issues: vec![Issue {
                id: 10,
                sector_id: 2,
                name: "Claim handling".to_string(),
                code: "CL".to_string(),
            }],
            products: vec![Product {
                id: 20,
                sector_id: 2,
                name: "Motor policy".to_string(),
                code: "MP".to_string(),
            }],
            outcomes: vec![Outcome { id: 30, name: "Upheld".to_string() }],
            not_upheld_reasons: vec![NotUpheldReason { id: 3, name: "Prescribed".to_string() }],
            providers: vec![
                Provider { id: 40, name: "Alpha Bank".to_string() },
                Provider { id: 41, name: "Beta Insurance".to_string() },
            ],
            decisions: vec![
                mk_decision(100, 2, vec![41]),
                mk_decision(101, 2, vec![41, 40]),
                mk_decision(102, 2, vec![40]),
                mk_decision(103, 1, vec![40]),
            ],
            decision_providers: vec![DecisionProvider {
                decision_provider_id: 900,
                decision_id: 101,
                provider_id: 41,
            }],
            complaint_classifications: Vec::new(),
            enquiries: Vec::new(),
        }
    }

    fn sample_enquiry_draft() -> EnquiryDraft {
        EnquiryDraft {
            title_id: "1".to_string(),
            name: "Maria".to_string(),
            surname: "Borg".to_string(),
            contact_number: "+356 2133 0000".to_string(),
            email: "maria.borg@example.com".to_string(),
            country: "MT".to_string(),
            sector: "1".to_string(),
            sector_other: None,
            enquiry: "Which forms do I need?".to_string(),
        }
    }

    fn section_payload(pairs: &[(&str, Value)]) -> SectionPayload {
        let mut payload = SectionPayload::new();
        for (key, value) in pairs {
            payload.insert((*key).to_string(), value.clone());
        }
        payload
    }

    // Test IDs: TAPI-001
    #[test]
    fn faceted_query_pages_through_string_typed_params() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());
        api.seed(&sample_seed())?;

        let page = api.query_decisions(&DecisionQueryParams {
            sector: Some("2".to_string()),
            page: Some("2".to_string()),
            limit: Some("1".to_string()),
            ..DecisionQueryParams::default()
        })?;

        assert_eq!(page.page, 2);
        assert_eq!(page.pages, 3);
        assert_eq!(page.decisions.keys().copied().collect::<Vec<_>>(), vec![101]);
        let projected = page
            .decisions
            .get(&101)
            .ok_or_else(|| anyhow::anyhow!("decision 101 missing"))?;
        assert_eq!(projected.sector.as_deref(), Some("Insurance"));
        assert_eq!(projected.provider_names, "Beta Insurance,<br/>Alpha Bank");
        assert_eq!(
            projected.providers.get(&41).and_then(|slot| slot.decision_provider_id),
            Some(900)
        );

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-002
    #[test]
    fn non_numeric_facet_values_are_rejected_per_field() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());
        api.seed(&sample_seed())?;

        let err = match api.query_decisions(&DecisionQueryParams {
            sector: Some("banking".to_string()),
            provider: Some("x".to_string()),
            ..DecisionQueryParams::default()
        }) {
            Ok(_) => return Err(anyhow::anyhow!("expected validation failure")),
            Err(err) => err,
        };

        let errors = match err.downcast_ref::<RegisterError>() {
            Some(RegisterError::Validation(errors)) => errors,
            other => return Err(anyhow::anyhow!("expected validation error, got {other:?}")),
        };
        assert_eq!(errors.get("sector").map(String::as_str), Some("sector must be a number"));
        assert_eq!(errors.get("provider").map(String::as_str), Some("provider must be a number"));

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-003
    #[test]
    fn empty_facet_values_are_no_ops() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());
        api.seed(&sample_seed())?;

        let page = api.query_decisions(&DecisionQueryParams {
            sector: Some(String::new()),
            language: Some(String::new()),
            ..DecisionQueryParams::default()
        })?;
        assert_eq!(page.decisions.len(), 4);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-004
    #[test]
    fn enquiry_uid_continues_from_seeded_count() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());

        let year = OffsetDateTime::now_utc().year();
        let mut seed = SeedData::default();
        for id in 1..=3 {
            seed.enquiries.push(Enquiry {
                id,
                uid: format_enquiry_uid(2024, id),
                title_id: "1".to_string(),
                name: "Maria".to_string(),
                surname: "Borg".to_string(),
                contact_number: "+356 2133 0000".to_string(),
                email: "maria.borg@example.com".to_string(),
                country: "MT".to_string(),
                sector: "1".to_string(),
                sector_other: None,
                enquiry: "Which forms do I need?".to_string(),
                status: "open".to_string(),
                created_at: 1_700_000_000,
            });
        }
        api.seed(&seed)?;

        assert_eq!(api.next_enquiry_uid()?.uid, format_enquiry_uid(year, 4));
        let created = api.create_enquiry(&sample_enquiry_draft())?;
        assert_eq!(created.uid, format_enquiry_uid(year, 4));
        assert_eq!(api.get_enquiry(&created.uid)?.uid, created.uid);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-005
    #[test]
    fn complaint_lifecycle_is_guarded_and_idempotent() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());

        let err = match api.init_complaint(&InitComplaintRequest::default()) {
            Ok(_) => return Err(anyhow::anyhow!("expected validation failure")),
            Err(err) => err,
        };
        assert!(matches!(
            err.downcast_ref::<RegisterError>(),
            Some(RegisterError::Validation(_))
        ));

        let complaint = api.init_complaint(&InitComplaintRequest {
            user_id: Some(7),
            complainant_type_id: Some(2),
            language: None,
        })?;
        assert_eq!(complaint.language, DEFAULT_LANGUAGE);

        let updated = api.update_complaint_section(
            complaint.id,
            6,
            &section_payload(&[("first_name", Value::String("A".to_string()))]),
        )?;
        assert_eq!(updated.complaint_section, 6);

        let first = api.submit_complaint(complaint.id)?;
        let second = api.submit_complaint(complaint.id)?;
        assert!(!first.already_submitted);
        assert!(second.already_submitted);
        assert_eq!(first.reference, second.reference);

        let listed = api.complaints_for_user(7)?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].complaint_uid.as_deref(), Some(first.reference.as_str()));

        let missing = match api.submit_complaint(424_242) {
            Ok(_) => return Err(anyhow::anyhow!("expected not-found failure")),
            Err(err) => err,
        };
        assert!(matches!(
            missing.downcast_ref::<RegisterError>(),
            Some(RegisterError::NotFound(_))
        ));

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-006
    #[test]
    fn director_create_reports_redirect_section() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());
        let complaint = api.init_complaint(&InitComplaintRequest {
            user_id: Some(7),
            complainant_type_id: Some(2),
            language: None,
        })?;

        let created = api.create_director(&DirectorDraft {
            complaint_id: Some(complaint.id),
            first_name: "Carmen".to_string(),
            last_name: "Vella".to_string(),
            email: None,
            role: None,
        })?;
        assert_eq!(created.redirect_section, 5);

        let listed = api.list_directors(Some(complaint.id))?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.director_id);

        api.delete_director(created.director_id)?;
        let err = match api.get_director(created.director_id) {
            Ok(_) => return Err(anyhow::anyhow!("expected not-found failure")),
            Err(err) => err,
        };
        assert!(matches!(err.downcast_ref::<RegisterError>(), Some(RegisterError::NotFound(_))));

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }

    // Test IDs: TAPI-007
    #[test]
    fn filter_options_and_sector_scoped_lookups() -> Result<()> {
        let db_path = unique_temp_db_path();
        let api = RedressApi::new(db_path.clone());
        api.seed(&sample_seed())?;

        let options = api.decision_filter_options()?;
        assert_eq!(options.sectors.len(), 2);
        assert_eq!(options.outcomes.len(), 1);
        assert_eq!(options.reasons.len(), 1);

        assert_eq!(api.issues_for_sector(2)?.len(), 1);
        assert!(api.issues_for_sector(1)?.is_empty());
        assert_eq!(api.products_for_sector(2)?.len(), 1);

        let _ = std::fs::remove_file(&db_path);
        Ok(())
    }
}
