use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use redress_api::{DecisionQueryParams, InitComplaintRequest, RedressApi, SeedData};
use redress_core::{DirectorDraft, EnquiryDraft, EnquiryFileDraft, SectionPayload};
use serde_json::Value;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "rr")]
#[command(about = "Redress case register CLI")]
struct Cli {
    #[arg(long, default_value = "./redress.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: Box<DbCommand>,
    },
    Decisions {
        #[command(subcommand)]
        command: Box<DecisionsCommand>,
    },
    Enquiry {
        #[command(subcommand)]
        command: Box<EnquiryCommand>,
    },
    Complaint {
        #[command(subcommand)]
        command: Box<ComplaintCommand>,
    },
    Director {
        #[command(subcommand)]
        command: Box<DirectorCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    Seed(DbSeedArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbSeedArgs {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Subcommand)]
enum DecisionsCommand {
    Query(DecisionsQueryArgs),
    Filters,
    Issues(SectorScopeArgs),
    Products(SectorScopeArgs),
}

#[derive(Debug, Args)]
struct DecisionsQueryArgs {
    #[arg(long)]
    page: Option<String>,
    #[arg(long)]
    limit: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    outcome: Option<String>,
    #[arg(long)]
    sector: Option<String>,
    #[arg(long)]
    issue: Option<String>,
    #[arg(long)]
    product: Option<String>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    language: Option<String>,
    #[arg(long)]
    case_reference: Option<String>,
}

#[derive(Debug, Args)]
struct SectorScopeArgs {
    #[arg(long)]
    sector_id: i64,
}

#[derive(Debug, Subcommand)]
enum EnquiryCommand {
    Create(EnquiryCreateArgs),
    NextUid,
    Show(EnquiryUidArgs),
    List(EnquiryListArgs),
    AttachFile(EnquiryAttachFileArgs),
    Files(EnquiryUidArgs),
}

#[derive(Debug, Args)]
struct EnquiryCreateArgs {
    #[arg(long)]
    title_id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    surname: String,
    #[arg(long)]
    contact_number: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    sector: String,
    #[arg(long)]
    sector_other: Option<String>,
    #[arg(long)]
    enquiry: String,
}

#[derive(Debug, Args)]
struct EnquiryUidArgs {
    #[arg(long)]
    uid: String,
}

#[derive(Debug, Args)]
struct EnquiryListArgs {
    #[arg(long)]
    email: Option<String>,
}

#[derive(Debug, Args)]
struct EnquiryAttachFileArgs {
    #[arg(long)]
    uid: String,
    #[arg(long)]
    filename: String,
    #[arg(long, default_value_t = 0)]
    filesize: i64,
    #[arg(long, default_value = "application/octet-stream")]
    mimetype: String,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Debug, Subcommand)]
enum ComplaintCommand {
    Init(ComplaintInitArgs),
    UpdateSection(ComplaintUpdateSectionArgs),
    Submit(ComplaintIdArgs),
    Show(ComplaintIdArgs),
    ListForUser(ComplaintListArgs),
}

#[derive(Debug, Args)]
struct ComplaintInitArgs {
    #[arg(long)]
    user_id: Option<i64>,
    #[arg(long)]
    complainant_type_id: Option<i64>,
    #[arg(long)]
    language: Option<String>,
}

#[derive(Debug, Args)]
struct ComplaintUpdateSectionArgs {
    #[arg(long)]
    id: i64,
    #[arg(long)]
    section: u8,
    /// Section payload as a JSON object, merged key-by-key.
    #[arg(long)]
    payload: String,
}

#[derive(Debug, Args)]
struct ComplaintIdArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
struct ComplaintListArgs {
    #[arg(long)]
    user_id: i64,
}

#[derive(Debug, Subcommand)]
enum DirectorCommand {
    Add(DirectorAddArgs),
    List(DirectorListArgs),
    Show(DirectorIdArgs),
    Remove(DirectorIdArgs),
}

#[derive(Debug, Args)]
struct DirectorAddArgs {
    #[arg(long)]
    complaint_id: Option<i64>,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    role: Option<String>,
}

#[derive(Debug, Args)]
struct DirectorListArgs {
    #[arg(long)]
    complaint_id: Option<i64>,
}

#[derive(Debug, Args)]
struct DirectorIdArgs {
    #[arg(long)]
    id: i64,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit<T>(value: &T) -> Result<()>
where
    T: serde::Serialize,
{
    emit_json(serde_json::to_value(value).context("failed to serialize output")?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = RedressApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(*command, &api),
        Command::Decisions { command } => run_decisions(*command, &api),
        Command::Enquiry { command } => run_enquiry(*command, &api),
        Command::Complaint { command } => run_complaint(*command, &api),
        Command::Director { command } => run_director(*command, &api),
    }
}

fn run_db(command: DbCommand, api: &RedressApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit(&result)
        }
        DbCommand::Seed(args) => {
            let body = fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read seed file {}", args.file.display()))?;
            let data: SeedData = serde_json::from_str(&body)
                .with_context(|| format!("failed to parse seed file {}", args.file.display()))?;
            let summary = api.seed(&data)?;
            emit(&summary)
        }
    }
}

fn run_decisions(command: DecisionsCommand, api: &RedressApi) -> Result<()> {
    match command {
        DecisionsCommand::Query(args) => {
            let page = api.query_decisions(&DecisionQueryParams {
                page: args.page,
                limit: args.limit,
                year: args.year,
                outcome: args.outcome,
                sector: args.sector,
                issue: args.issue,
                product: args.product,
                provider: args.provider,
                language: args.language,
                case_reference: args.case_reference,
            })?;
            emit(&page)
        }
        DecisionsCommand::Filters => emit(&api.decision_filter_options()?),
        DecisionsCommand::Issues(args) => emit(&api.issues_for_sector(args.sector_id)?),
        DecisionsCommand::Products(args) => emit(&api.products_for_sector(args.sector_id)?),
    }
}

fn run_enquiry(command: EnquiryCommand, api: &RedressApi) -> Result<()> {
    match command {
        EnquiryCommand::Create(args) => {
            let enquiry = api.create_enquiry(&EnquiryDraft {
                title_id: args.title_id,
                name: args.name,
                surname: args.surname,
                contact_number: args.contact_number,
                email: args.email,
                country: args.country,
                sector: args.sector,
                sector_other: args.sector_other,
                enquiry: args.enquiry,
            })?;
            emit(&enquiry)
        }
        EnquiryCommand::NextUid => emit(&api.next_enquiry_uid()?),
        EnquiryCommand::Show(args) => emit(&api.get_enquiry(&args.uid)?),
        EnquiryCommand::List(args) => emit(&api.list_enquiries(args.email.as_deref())?),
        EnquiryCommand::AttachFile(args) => {
            let file = api.attach_enquiry_file(
                &args.uid,
                &EnquiryFileDraft {
                    filename: args.filename,
                    filesize: args.filesize,
                    mimetype: args.mimetype,
                    description: args.description,
                },
            )?;
            emit(&file)
        }
        EnquiryCommand::Files(args) => emit(&api.list_enquiry_files(&args.uid)?),
    }
}

fn run_complaint(command: ComplaintCommand, api: &RedressApi) -> Result<()> {
    match command {
        ComplaintCommand::Init(args) => {
            let complaint = api.init_complaint(&InitComplaintRequest {
                user_id: args.user_id,
                complainant_type_id: args.complainant_type_id,
                language: args.language,
            })?;
            emit(&complaint)
        }
        ComplaintCommand::UpdateSection(args) => {
            let payload: SectionPayload = serde_json::from_str(&args.payload)
                .context("payload must be a JSON object of section fields")?;
            let complaint = api.update_complaint_section(args.id, args.section, &payload)?;
            emit(&complaint)
        }
        ComplaintCommand::Submit(args) => emit(&api.submit_complaint(args.id)?),
        ComplaintCommand::Show(args) => emit(&api.get_complaint(args.id)?),
        ComplaintCommand::ListForUser(args) => emit(&api.complaints_for_user(args.user_id)?),
    }
}

fn run_director(command: DirectorCommand, api: &RedressApi) -> Result<()> {
    match command {
        DirectorCommand::Add(args) => {
            let created = api.create_director(&DirectorDraft {
                complaint_id: args.complaint_id,
                first_name: args.first_name,
                last_name: args.last_name,
                email: args.email,
                role: args.role,
            })?;
            emit(&created)
        }
        DirectorCommand::List(args) => emit(&api.list_directors(args.complaint_id)?),
        DirectorCommand::Show(args) => emit(&api.get_director(args.id)?),
        DirectorCommand::Remove(args) => {
            api.delete_director(args.id)?;
            emit_json(serde_json::json!({ "deleted": args.id }))
        }
    }
}
