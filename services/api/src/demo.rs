use std::sync::Arc;
use std::time::Duration;

use admissions::error::AppError;
use admissions::workflows::admissions::{
    available_actions, derive_timeline, AdmissionAction, AdmissionIntake, AdmissionRequest,
    InterviewSlot, LifecyclePolicy, PeriodCatalog, PeriodId, PeriodWatcher, SchoolPeriod,
    StepStatus,
};
use chrono::{Duration as DateSpan, Local, NaiveDate};
use clap::Args;

use crate::infra::{admissions_state, InMemoryPeriodCatalog};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// First proposed interview date (YYYY-MM-DD). Defaults to one week from today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) interview_date: Option<NaiveDate>,
    /// Ordering value of the school year that already exists in the catalog.
    #[arg(long, default_value_t = 2024)]
    pub(crate) current_period: i64,
    /// Enroll straight into the current period instead of deferring to the next one.
    #[arg(long)]
    pub(crate) enroll_now: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        interview_date,
        current_period,
        enroll_now,
    } = args;

    let first_date =
        interview_date.unwrap_or_else(|| Local::now().date_naive() + DateSpan::days(7));
    let offered = [
        InterviewSlot::on(first_date),
        InterviewSlot::on(first_date + DateSpan::days(1)),
    ];

    let catalog = Arc::new(InMemoryPeriodCatalog::with_periods(vec![SchoolPeriod::new(
        current_period.to_string(),
        current_period,
    )]));
    let (state, notifier) = admissions_state(LifecyclePolicy::default(), catalog.clone());
    let service = state.service.clone();

    println!("Admissions workflow demo");
    let request = service.submit(AdmissionIntake {
        applicant_name: "Valentina Ríos".to_string(),
        family_contact: "rios.familia@example.org".to_string(),
        requested_grade: Some("1st grade".to_string()),
    })?;
    let id = request.id.clone();
    render_progress("Request received", &request);

    let proposal = service.apply(
        &id,
        AdmissionAction::Schedule {
            slots: offered.to_vec(),
            required_documents: vec![
                "Birth certificate".to_string(),
                "Previous school report".to_string(),
            ],
            attachment_links: Vec::new(),
            response_deadline: Some(first_date - DateSpan::days(2)),
        },
    )?;
    render_progress("Interview slots proposed", &proposal.request);

    let selected = service.select_slot(&id, 1)?;
    render_progress("Family picked the second slot", &selected);

    let confirmed = service.apply(
        &id,
        AdmissionAction::ConfirmDate {
            slot: offered[1],
            manual_override: false,
        },
    )?;
    render_progress("Staff confirmed the interview", &confirmed.request);

    let interviewed = service.apply(
        &id,
        AdmissionAction::RecordInterview {
            performed: true,
            comments: Some("Warm conversation, reading at grade level".to_string()),
        },
    )?;
    render_progress("Interview held", &interviewed.request);

    let accepted = service.apply(
        &id,
        AdmissionAction::Decide {
            accept: true,
            message: "We are happy to welcome Valentina".to_string(),
        },
    )?;
    render_progress("Applicant accepted", &accepted.request);

    if enroll_now {
        let record = service.enroll(&id, &PeriodId(current_period.to_string()), None)?;
        println!(
            "\nEnrolled into {} as {}",
            current_period,
            record.student_id.as_deref().unwrap_or("unknown student")
        );
    } else {
        let watcher = PeriodWatcher::new(
            catalog.clone(),
            state.deferrals.clone(),
            Duration::from_secs(1),
        );
        let ticket = state.deferrals.request(&id, &catalog.list()?);
        println!(
            "\nEnrollment deferred until a period newer than {} exists",
            ticket.baseline_max_order
        );

        let unchanged = watcher.poll_once()?;
        println!("- catalog refresh, no new period: {} resumed", unchanged.len());

        let next_period = current_period + 1;
        catalog.create(SchoolPeriod::new(next_period.to_string(), next_period));
        for event in watcher.poll_once()? {
            let record = service.resume(&event)?;
            println!(
                "- period {} created: enrolled as {}",
                event.period_id,
                record.student_id.as_deref().unwrap_or("unknown student")
            );
        }
    }

    let enrolled = service.get(&id)?;
    render_progress("Final state", &enrolled);

    println!("\nFamily notifications");
    for notification in notifier.sent() {
        println!(
            "- {} -> {}",
            notification.template, notification.recipient
        );
    }

    Ok(())
}

fn render_progress(headline: &str, request: &AdmissionRequest) {
    println!("\n{headline} [{}]", request.state.label());
    for entry in derive_timeline(request) {
        let marker = match entry.status {
            StepStatus::Done => "x",
            StepStatus::Current => ">",
            StepStatus::Upcoming => " ",
            StepStatus::Skipped => "-",
        };
        println!("  [{marker}] {}", entry.label);
    }

    let actions: Vec<&str> = available_actions(request)
        .into_iter()
        .map(|action| action.label())
        .collect();
    if !actions.is_empty() {
        println!("  next: {}", actions.join(", "));
    }
}
