use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Per-field validation messages, keyed by the offending field name.
pub type FieldErrors = BTreeMap<String, String>;

/// Opaque section payload: string keys mapped to arbitrary JSON values.
/// The workflow merges these shallowly and never interprets their contents.
pub type SectionPayload = serde_json::Map<String, Value>;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegisterError {
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(FieldErrors),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid section: {0}")]
    InvalidSection(u8),
    #[error("complaint already submitted")]
    AlreadySubmitted,
}

impl RegisterError {
    #[must_use]
    pub fn validation(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.to_string());
        Self::Validation(errors)
    }

    #[must_use]
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(entity.to_string())
    }
}

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_DIRECTOR_ROLE: &str = "Director";
pub const ENQUIRY_STATUS_OPEN: &str = "open";
pub const ENQUIRY_MAX_CHARS: usize = 10_000;
pub const PROVIDER_NAME_SEPARATOR: &str = ",<br/>";

/// Section the director form hands back to after a successful add.
pub const DIRECTOR_REDIRECT_SECTION: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Sector {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Outcome {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NotUpheldReason {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Provider {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Issue {
    pub id: i64,
    pub sector_id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Product {
    pub id: i64,
    pub sector_id: i64,
    pub name: String,
    pub code: String,
}

/// Join row linking one decision to one provider; the per-decision
/// `providers` map surfaces its id when present.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DecisionProvider {
    pub decision_provider_id: i64,
    pub decision_id: i64,
    pub provider_id: i64,
}

/// Classification attached to a closed complaint. A non-zero closure date
/// supersedes the decision's own `year_of_decision` at read time.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ComplaintClassification {
    pub id: i64,
    pub complaint_id: i64,
    #[serde(default)]
    pub closure_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Decision {
    pub decision_id: i64,
    pub case_reference_number: String,
    pub complaint_id: i64,
    pub sector_id: i64,
    pub issue_id: i64,
    pub product_id: i64,
    pub outcome_id: i64,
    #[serde(default)]
    pub not_upheld_reason_id: Option<i64>,
    pub provider_ids: Vec<i64>,
    pub year_of_decision: i64,
    pub published_date: i64,
    pub published: bool,
    pub court_appeal: bool,
    pub language: String,
    pub complainant: String,
    pub file_path: String,
    pub file_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(into = "i64", try_from = "i64")]
pub enum ComplaintStatus {
    Draft,
    Submitted,
}

impl ComplaintStatus {
    #[must_use]
    pub fn status_id(self) -> i64 {
        match self {
            Self::Draft => 1,
            Self::Submitted => 2,
        }
    }

    #[must_use]
    pub fn parse(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Draft),
            2 => Some(Self::Submitted),
            _ => None,
        }
    }
}

impl From<ComplaintStatus> for i64 {
    fn from(status: ComplaintStatus) -> Self {
        status.status_id()
    }
}

impl TryFrom<i64> for ComplaintStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::parse(value).ok_or_else(|| format!("unknown status_id: {value}"))
    }
}

/// The five independently updatable portions of a complaint submission.
/// Section numbers follow the multi-step form; 1, 3, 4 and 9 carry no
/// server-side payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ComplaintSection {
    Individual,
    Company,
    Assistant,
    ServiceProvider,
    Details,
}

impl ComplaintSection {
    pub const ALL: [Self; 5] =
        [Self::Individual, Self::Company, Self::Assistant, Self::ServiceProvider, Self::Details];

    #[must_use]
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            2 => Some(Self::Individual),
            5 => Some(Self::Company),
            6 => Some(Self::Assistant),
            7 => Some(Self::ServiceProvider),
            8 => Some(Self::Details),
            _ => None,
        }
    }

    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Individual => 2,
            Self::Company => 5,
            Self::Assistant => 6,
            Self::ServiceProvider => 7,
            Self::Details => 8,
        }
    }

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Company => "company",
            Self::Assistant => "assistant",
            Self::ServiceProvider => "service_provider",
            Self::Details => "details",
        }
    }
}

/// Shallow merge: every key in `payload` overwrites the target key; keys
/// absent from `payload` are retained.
pub fn merge_section(target: &mut SectionPayload, payload: &SectionPayload) {
    for (key, value) in payload {
        target.insert(key.clone(), value.clone());
    }
}

fn company_section_shape() -> SectionPayload {
    let mut section = SectionPayload::new();
    section.insert("directors".to_string(), Value::Array(Vec::new()));
    section
}

fn service_provider_section_shape() -> SectionPayload {
    let mut section = SectionPayload::new();
    section.insert("provider_ids".to_string(), Value::Array(Vec::new()));
    section.insert("product_name".to_string(), Value::String(String::new()));
    section.insert("reference".to_string(), Value::String(String::new()));
    section
}

fn details_section_shape() -> SectionPayload {
    let mut section = SectionPayload::new();
    section.insert("additional_files".to_string(), Value::Array(Vec::new()));
    section
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Complaint {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "status_id")]
    pub status: ComplaintStatus,
    pub complainant_type_id: i64,
    pub language: String,
    pub complaint_section: u8,
    pub date_created: i64,
    pub date_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_originated: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_uid: Option<String>,
    #[serde(default)]
    pub individual: SectionPayload,
    #[serde(default)]
    pub company: SectionPayload,
    #[serde(default)]
    pub assistant: SectionPayload,
    #[serde(default)]
    pub service_provider: SectionPayload,
    #[serde(default)]
    pub details: SectionPayload,
}

impl Complaint {
    /// Fresh Draft complaint with all section payloads in their empty shapes.
    #[must_use]
    pub fn new(id: i64, user_id: i64, complainant_type_id: i64, language: String, now: i64) -> Self {
        Self {
            id,
            user_id,
            status: ComplaintStatus::Draft,
            complainant_type_id,
            language,
            complaint_section: 1,
            date_created: now,
            date_updated: now,
            date_originated: None,
            complaint_uid: None,
            individual: SectionPayload::new(),
            company: company_section_shape(),
            assistant: SectionPayload::new(),
            service_provider: service_provider_section_shape(),
            details: details_section_shape(),
        }
    }

    #[must_use]
    pub fn section(&self, section: ComplaintSection) -> &SectionPayload {
        match section {
            ComplaintSection::Individual => &self.individual,
            ComplaintSection::Company => &self.company,
            ComplaintSection::Assistant => &self.assistant,
            ComplaintSection::ServiceProvider => &self.service_provider,
            ComplaintSection::Details => &self.details,
        }
    }

    fn section_mut(&mut self, section: ComplaintSection) -> &mut SectionPayload {
        match section {
            ComplaintSection::Individual => &mut self.individual,
            ComplaintSection::Company => &mut self.company,
            ComplaintSection::Assistant => &mut self.assistant,
            ComplaintSection::ServiceProvider => &mut self.service_provider,
            ComplaintSection::Details => &mut self.details,
        }
    }

    /// Merge `payload` into the named section, raise the progress marker and
    /// refresh `date_updated`. `complaint_section` never decreases.
    ///
    /// # Errors
    /// Returns [`RegisterError::AlreadySubmitted`] once the complaint has
    /// been finalized; Submitted is terminal for section edits.
    pub fn apply_section_update(
        &mut self,
        section: ComplaintSection,
        payload: &SectionPayload,
        now: i64,
    ) -> Result<(), RegisterError> {
        if self.status == ComplaintStatus::Submitted {
            return Err(RegisterError::AlreadySubmitted);
        }

        merge_section(self.section_mut(section), payload);
        self.complaint_section = self.complaint_section.max(section.number());
        self.date_updated = now;
        Ok(())
    }

    /// Transition to Submitted, stamping the reference and origination date.
    /// Finalizing an already Submitted complaint is a no-op that hands back
    /// the existing reference; `complaint_uid` and `date_originated` are
    /// immutable once set.
    pub fn finalize(&mut self, reference: String, now: i64) -> SubmitReceipt {
        if let Some(existing) = &self.complaint_uid {
            return SubmitReceipt {
                complaint_id: self.id,
                reference: existing.clone(),
                already_submitted: true,
            };
        }

        self.status = ComplaintStatus::Submitted;
        self.complaint_uid = Some(reference.clone());
        self.date_originated = Some(now);
        SubmitReceipt { complaint_id: self.id, reference, already_submitted: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SubmitReceipt {
    pub complaint_id: i64,
    pub reference: String,
    pub already_submitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Director {
    pub id: i64,
    pub complaint_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DirectorDraft {
    #[serde(default)]
    pub complaint_id: Option<i64>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl DirectorDraft {
    /// # Errors
    /// Returns [`RegisterError::Validation`] with one message per missing
    /// required field.
    pub fn validate(&self) -> Result<(), RegisterError> {
        let mut errors = FieldErrors::new();
        if self.complaint_id.is_none() {
            errors.insert(
                "session".to_string(),
                "Complaint ID is missing from session/request".to_string(),
            );
        }
        if self.first_name.is_empty() {
            errors.insert("first_name".to_string(), "First name is required".to_string());
        }
        if self.last_name.is_empty() {
            errors.insert("last_name".to_string(), "Last name is required".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegisterError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Enquiry {
    pub id: i64,
    pub uid: String,
    pub title_id: String,
    pub name: String,
    pub surname: String,
    pub contact_number: String,
    pub email: String,
    pub country: String,
    pub sector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_other: Option<String>,
    pub enquiry: String,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnquiryDraft {
    #[serde(default)]
    pub title_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub contact_number: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub sector_other: Option<String>,
    #[serde(default)]
    pub enquiry: String,
}

impl EnquiryDraft {
    fn required_fields(&self) -> [(&'static str, &str); 8] {
        [
            ("title_id", &self.title_id),
            ("name", &self.name),
            ("surname", &self.surname),
            ("contact_number", &self.contact_number),
            ("email", &self.email),
            ("country", &self.country),
            ("sector", &self.sector),
            ("enquiry", &self.enquiry),
        ]
    }

    /// # Errors
    /// Returns [`RegisterError::Validation`] with one message per violated
    /// rule: missing required fields, a malformed email address, sector
    /// "other" without detail, or an over-long enquiry body.
    pub fn validate(&self) -> Result<(), RegisterError> {
        let mut errors = FieldErrors::new();

        for (field, value) in self.required_fields() {
            if value.is_empty() {
                errors.insert(field.to_string(), format!("{} is required", field.replacen('_', " ", 1)));
            }
        }

        if !self.email.is_empty() && !email_is_valid(&self.email) {
            errors.insert("email".to_string(), "Please enter a valid email".to_string());
        }

        if self.sector == "4" && self.sector_other.as_deref().unwrap_or("").is_empty() {
            errors.insert("sector_other".to_string(), "Please specify sector".to_string());
        }

        if self.enquiry.chars().count() > ENQUIRY_MAX_CHARS {
            errors.insert(
                "enquiry".to_string(),
                format!("Enquiry cannot be longer than {ENQUIRY_MAX_CHARS} characters"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegisterError::Validation(errors))
        }
    }
}

/// Structural email check: exactly one `@`, no whitespace, and a dot with
/// non-empty text on both sides in the domain part.
#[must_use]
pub fn email_is_valid(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    matches!(domain.rsplit_once('.'), Some((head, tail)) if !head.is_empty() && !tail.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnquiryFile {
    pub id: i64,
    pub enquiry_uid: String,
    pub filename: String,
    pub filesize: i64,
    pub mimetype: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct EnquiryFileDraft {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filesize: i64,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub description: String,
}

#[must_use]
pub fn format_enquiry_uid(year: i32, sequence: i64) -> String {
    format!("ENQ_{year}_{sequence:04}")
}

#[must_use]
pub fn format_complaint_reference(sequence: i64, year: i32) -> String {
    format!("ASF {sequence:03}/{year}")
}

#[must_use]
pub fn appeal_label(court_appeal: bool) -> &'static str {
    if court_appeal {
        "Appealed"
    } else {
        "Not Appealed"
    }
}

/// Calendar year of an epoch-seconds timestamp, interpreted in UTC.
/// Out-of-range timestamps yield `None` rather than failing.
#[must_use]
pub fn year_of_epoch(epoch: i64) -> Option<i32> {
    OffsetDateTime::from_unix_timestamp(epoch).ok().map(|moment| moment.year())
}

/// `DD/MM/YYYY` rendering of an epoch-seconds timestamp (UTC). Out-of-range
/// timestamps degrade to an empty string; a broken date never fails a query.
#[must_use]
pub fn format_day_month_year(epoch: i64) -> String {
    match OffsetDateTime::from_unix_timestamp(epoch) {
        Ok(moment) => {
            let date = moment.date();
            format!("{:02}/{:02}/{}", date.day(), u8::from(date.month()), date.year())
        }
        Err(_) => String::new(),
    }
}

/// Optional facet predicates over the published-decisions collection.
/// Every supplied facet narrows the result set; absent facets are no-ops.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DecisionFilters {
    pub year: Option<i32>,
    pub outcome_id: Option<i64>,
    pub sector_id: Option<i64>,
    pub issue_id: Option<i64>,
    pub product_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub language: Option<String>,
    pub case_reference: Option<String>,
}

pub const DEFAULT_PAGE_LIMIT: u64 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Page and limit are both clamped to a minimum of 1.
    #[must_use]
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page: page.max(1), limit: limit.max(1) }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_LIMIT }
    }
}

/// Key→record maps over the reference collections, built once per query so
/// joins are lookups instead of per-decision scans. Lookup misses are a
/// valid outcome, never an error.
#[derive(Debug, Default)]
pub struct ReferenceIndex<'a> {
    sectors: BTreeMap<i64, &'a Sector>,
    issues: BTreeMap<i64, &'a Issue>,
    products: BTreeMap<i64, &'a Product>,
    outcomes: BTreeMap<i64, &'a Outcome>,
    providers: BTreeMap<i64, &'a Provider>,
    decision_providers: BTreeMap<(i64, i64), i64>,
    closure_dates: BTreeMap<i64, i64>,
}

impl<'a> ReferenceIndex<'a> {
    #[must_use]
    pub fn build(
        sectors: &'a [Sector],
        issues: &'a [Issue],
        products: &'a [Product],
        outcomes: &'a [Outcome],
        providers: &'a [Provider],
        decision_providers: &'a [DecisionProvider],
        classifications: &'a [ComplaintClassification],
    ) -> Self {
        let mut index = Self::default();
        for sector in sectors {
            index.sectors.insert(sector.id, sector);
        }
        for issue in issues {
            index.issues.insert(issue.id, issue);
        }
        for product in products {
            index.products.insert(product.id, product);
        }
        for outcome in outcomes {
            index.outcomes.insert(outcome.id, outcome);
        }
        for provider in providers {
            index.providers.insert(provider.id, provider);
        }
        for link in decision_providers {
            index
                .decision_providers
                .insert((link.decision_id, link.provider_id), link.decision_provider_id);
        }
        for classification in classifications {
            // A zero closure date is treated as absent.
            if let Some(closure_date) = classification.closure_date.filter(|&date| date != 0) {
                index.closure_dates.insert(classification.complaint_id, closure_date);
            }
        }
        index
    }

    #[must_use]
    pub fn sector(&self, id: i64) -> Option<&Sector> {
        self.sectors.get(&id).copied()
    }

    #[must_use]
    pub fn issue(&self, id: i64) -> Option<&Issue> {
        self.issues.get(&id).copied()
    }

    #[must_use]
    pub fn product(&self, id: i64) -> Option<&Product> {
        self.products.get(&id).copied()
    }

    #[must_use]
    pub fn outcome(&self, id: i64) -> Option<&Outcome> {
        self.outcomes.get(&id).copied()
    }

    #[must_use]
    pub fn provider(&self, id: i64) -> Option<&Provider> {
        self.providers.get(&id).copied()
    }

    #[must_use]
    pub fn decision_provider_id(&self, decision_id: i64, provider_id: i64) -> Option<i64> {
        self.decision_providers.get(&(decision_id, provider_id)).copied()
    }

    #[must_use]
    pub fn closure_date(&self, complaint_id: i64) -> Option<i64> {
        self.closure_dates.get(&complaint_id).copied()
    }
}

/// One provider's slot in a decision's `providers` map.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProviderAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_provider_id: Option<i64>,
    pub provider_id: i64,
    pub service_provider: String,
}

/// Display-ready projection of one decision: foreign keys resolved to names
/// and codes where they exist, dates formatted, appeal state rendered.
/// Unresolvable references omit their derived fields.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProjectedDecision {
    pub decision_id: i64,
    pub case_reference_number: String,
    pub file_path: String,
    pub file_id: i64,
    pub language: String,
    pub complainant: String,
    pub sector_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub complaint_category_issue_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_category_issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_category_issue_code: Option<String>,
    pub complaint_category_product_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_category_product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_category_product_code: Option<String>,
    pub year_of_decision: i64,
    pub year_of_decision_formatted: String,
    pub outcome_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_upheld_reason_id: Option<i64>,
    pub published_date: i64,
    pub published_date_formatted: String,
    pub published: bool,
    pub court_appeal: String,
    pub providers: BTreeMap<i64, ProviderAssignment>,
    pub provider_names: String,
    pub provider_ids: Vec<i64>,
}

/// Page-scoped filter metadata: calendar years and providers seen across the
/// projected page (not the full filtered set), for filter-UI hydration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilterSummary {
    pub years: BTreeSet<i32>,
    pub providers_load: BTreeMap<i64, Provider>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DecisionQueryPage {
    pub page: u64,
    pub pages: u64,
    pub filters: FilterSummary,
    pub decisions: BTreeMap<i64, ProjectedDecision>,
}

#[must_use]
fn pages_for(total: u64, limit: u64) -> u64 {
    total.div_ceil(limit).max(1)
}

fn decision_matches(decision: &Decision, filters: &DecisionFilters) -> bool {
    if let Some(year) = filters.year {
        if year_of_epoch(decision.year_of_decision) != Some(year) {
            return false;
        }
    }
    if let Some(outcome_id) = filters.outcome_id {
        if decision.outcome_id != outcome_id {
            return false;
        }
    }
    if let Some(sector_id) = filters.sector_id {
        if decision.sector_id != sector_id {
            return false;
        }
    }
    if let Some(issue_id) = filters.issue_id {
        if decision.issue_id != issue_id {
            return false;
        }
    }
    if let Some(product_id) = filters.product_id {
        if decision.product_id != product_id {
            return false;
        }
    }
    if let Some(provider_id) = filters.provider_id {
        if !decision.provider_ids.contains(&provider_id) {
            return false;
        }
    }
    if let Some(language) = &filters.language {
        if decision.language != *language {
            return false;
        }
    }
    if let Some(case_reference) = &filters.case_reference {
        // Case-sensitive substring containment against the raw string.
        if !decision.case_reference_number.contains(case_reference.as_str()) {
            return false;
        }
    }
    true
}

fn project_decision(
    decision: &Decision,
    index: &ReferenceIndex<'_>,
    years: &mut BTreeSet<i32>,
    providers_load: &mut BTreeMap<i64, Provider>,
) -> ProjectedDecision {
    // A closure date recorded against the originating complaint supersedes
    // the decision's own year, both in the projection and the year facet.
    let effective_decision_date =
        index.closure_date(decision.complaint_id).unwrap_or(decision.year_of_decision);
    if let Some(year) = year_of_epoch(effective_decision_date) {
        years.insert(year);
    }

    let sector = index.sector(decision.sector_id);
    let issue = index.issue(decision.issue_id);
    let product = index.product(decision.product_id);
    let outcome = index.outcome(decision.outcome_id);

    let mut providers = BTreeMap::new();
    let mut provider_names = Vec::new();
    for &provider_id in &decision.provider_ids {
        let Some(provider) = index.provider(provider_id) else {
            continue;
        };
        providers_load.insert(provider_id, provider.clone());
        provider_names.push(provider.name.clone());
        providers.insert(
            provider_id,
            ProviderAssignment {
                decision_provider_id: index
                    .decision_provider_id(decision.decision_id, provider_id),
                provider_id,
                service_provider: provider.name.clone(),
            },
        );
    }

    ProjectedDecision {
        decision_id: decision.decision_id,
        case_reference_number: decision.case_reference_number.clone(),
        file_path: decision.file_path.clone(),
        file_id: decision.file_id,
        language: decision.language.clone(),
        complainant: decision.complainant.clone(),
        sector_id: decision.sector_id,
        sector: sector.map(|record| record.name.clone()),
        complaint_category_issue_id: decision.issue_id,
        complaint_category_issue: issue.map(|record| record.name.clone()),
        complaint_category_issue_code: issue.map(|record| record.code.clone()),
        complaint_category_product_id: decision.product_id,
        complaint_category_product: product.map(|record| record.name.clone()),
        complaint_category_product_code: product.map(|record| record.code.clone()),
        year_of_decision: effective_decision_date,
        year_of_decision_formatted: format_day_month_year(effective_decision_date),
        outcome_id: decision.outcome_id,
        outcome: outcome.map(|record| record.name.clone()),
        not_upheld_reason_id: decision.not_upheld_reason_id,
        published_date: decision.published_date,
        published_date_formatted: format_day_month_year(decision.published_date),
        published: decision.published,
        court_appeal: appeal_label(decision.court_appeal).to_string(),
        providers,
        provider_names: provider_names.join(PROVIDER_NAME_SEPARATOR),
        provider_ids: decision.provider_ids.clone(),
    }
}

/// Facet-filter, join, paginate and denormalize the published decisions.
///
/// Filters are conjunctive over the published subset. `pages` is
/// `max(1, ceil(total / limit))`; a page past the end yields an empty map.
/// Filter metadata (`years`, `providers_load`) is scoped to the returned
/// page. Reference misses degrade the projection, never the query.
#[must_use]
pub fn query_decisions(
    decisions: &[Decision],
    index: &ReferenceIndex<'_>,
    filters: &DecisionFilters,
    page: PageRequest,
) -> DecisionQueryPage {
    let matched: Vec<&Decision> = decisions
        .iter()
        .filter(|decision| decision.published && decision_matches(decision, filters))
        .collect();

    let total = u64::try_from(matched.len()).unwrap_or(u64::MAX);
    let pages = pages_for(total, page.limit);
    let offset = usize::try_from((page.page - 1).saturating_mul(page.limit)).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);

    let mut years = BTreeSet::new();
    let mut providers_load = BTreeMap::new();
    let mut projected = BTreeMap::new();
    for decision in matched.iter().skip(offset).take(limit) {
        projected.insert(
            decision.decision_id,
            project_decision(decision, index, &mut years, &mut providers_load),
        );
    }

    DecisionQueryPage {
        page: page.page,
        pages,
        filters: FilterSummary { years, providers_load },
        decisions: projected,
    }
}
