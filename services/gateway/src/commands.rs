use clap::Args;
use squadron_intake::config::AppConfig;
use squadron_intake::error::AppError;
use squadron_intake::workflows::intake::{
    ApplicationRecord, ApplicationRepository, ApplicationStatus, CsvApplicationRepository,
    IntakeAssets,
};

#[derive(Args, Debug, Default)]
pub(crate) struct ApplicationsListArgs {
    /// Only list applications in this status (canonical or legacy spelling)
    #[arg(long, value_parser = parse_status)]
    pub(crate) status: Option<ApplicationStatus>,
}

pub(crate) fn parse_status(raw: &str) -> Result<ApplicationStatus, String> {
    ApplicationStatus::parse(raw).ok_or_else(|| {
        format!(
            "unknown application status '{raw}' (expected submitted-unannounced, pending-review, accepted or denied)"
        )
    })
}

pub(crate) fn run_check() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let assets = IntakeAssets::load(&config.intake.assets)?;
    let repository = CsvApplicationRepository::new(&config.intake.store_path, &assets.catalog);
    let records = repository.list_all()?;

    println!("{}", check_summary(&config, &assets, &records));
    Ok(())
}

pub(crate) fn run_applications_list(args: ApplicationsListArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let assets = IntakeAssets::load(&config.intake.assets)?;
    let repository = CsvApplicationRepository::new(&config.intake.store_path, &assets.catalog);

    let records = match args.status {
        Some(status) => repository.list_by_status(status)?,
        None => repository.list_all()?,
    };

    println!("{}", format_applications(&records));
    Ok(())
}

pub(crate) fn check_summary(
    config: &AppConfig,
    assets: &IntakeAssets,
    records: &[ApplicationRecord],
) -> String {
    let recruiting = assets.directory.recruiting_names();
    let callsign = assets
        .catalog
        .callsign_question()
        .map(|question| question.text.as_str())
        .unwrap_or("none, nicknames use the platform username");

    let mut lines = vec![
        "Configuration OK".to_string(),
        format!("  environment: {:?}", config.environment),
        format!("  listen: {}:{}", config.server.host, config.server.port),
        format!("  guild: {}", config.intake.guild_id),
        format!(
            "  questions: {} (callsign question: {callsign})",
            assets.catalog.len()
        ),
        format!(
            "  groups: {} ({} recruiting: {})",
            assets.directory.entries().len(),
            recruiting.len(),
            recruiting.join(", ")
        ),
        format!("  announcement bodies: {}", assets.announcements.bodies().len()),
        format!(
            "  store: {} ({} records)",
            config.intake.store_path.display(),
            records.len()
        ),
    ];

    for status in [
        ApplicationStatus::SubmittedUnannounced,
        ApplicationStatus::PendingReview,
        ApplicationStatus::Accepted,
        ApplicationStatus::Denied,
    ] {
        let count = records
            .iter()
            .filter(|record| record.status == status)
            .count();
        lines.push(format!("    {status}: {count}"));
    }

    lines.join("\n")
}

pub(crate) fn format_applications(records: &[ApplicationRecord]) -> String {
    if records.is_empty() {
        return "No applications on file.".to_string();
    }

    let mut lines = vec![format!("{} application(s)", records.len())];
    lines.extend(records.iter().map(|record| {
        format!(
            "- {} ({}) [{}] submitted {} in {:.1}s",
            record.applicant_username,
            record.applicant_id,
            record.status,
            record.submitted_at_label(),
            record.fill_duration_seconds
        )
    }));
    lines.join("\n")
}
