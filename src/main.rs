use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use patient_events::config::AppConfig;
use patient_events::consumer::{ConsumerWorker, LoggingEventHandler};
use patient_events::domain::patient::{
    ContactInfo, Demographics, EmergencyContact, Gender, InMemoryPatientRepository, PatientDetails, PatientService,
    Relationship,
};
use patient_events::domain::Actor;
use patient_events::messaging::{
    ConsumerSettings, MessageBroker, ProducerSettings, RedpandaClient, RedpandaConsumer, RedpandaProducers,
    TopicProvisioner,
};
use patient_events::metrics::{self, Metrics};
use patient_events::publisher::{
    AuditPublisher, DeadLetterRouter, DisabledEventPublisher, EventPublisher, KafkaEventPublisher,
};
use patient_events::utils::CircuitBreakerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, crate at DEBUG; override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,patient_events=debug")))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        brokers = %config.bootstrap_servers,
        topic = %config.topics.patient_events,
        publishing_enabled = config.publishing_enabled,
        strict_validation = config.strict_validation,
        "Starting patient event service"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, metrics_port)) {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    // === 2. Publisher (optional) ===
    let publisher: Arc<dyn EventPublisher> = if config.publishing_enabled {
        TopicProvisioner::new(&config.bootstrap_servers)?
            .ensure_topics(&config.topics.specs())
            .await?;

        // Separate clients, separate breakers: audit and dead-letter trouble
        // must not trip the primary stream
        let producers = RedpandaProducers::connect(
            &config.bootstrap_servers,
            &ProducerSettings::reliable(),
            &ProducerSettings::dead_letter(),
            CircuitBreakerConfig::broker(),
        )?;

        background.push(tokio::spawn(report_circuit_state(
            producers.events.clone(),
            metrics.clone(),
            shutdown_rx.clone(),
        )));

        let events_broker: Arc<dyn MessageBroker> = producers.events;
        let dead_letters =
            DeadLetterRouter::new(producers.dead_letter, &config.topics.dead_letter).with_metrics(metrics.clone());
        let audit = AuditPublisher::new(producers.audit, &config.topics.audit).with_metrics(metrics.clone());

        // === 3. Listener on the primary topic ===
        let consumer = RedpandaConsumer::subscribe(
            &config.bootstrap_servers,
            &ConsumerSettings::listener(format!("{}-listener", config.consumer_group)),
            &config.topics.patient_events,
        )?;
        let worker = ConsumerWorker::new(
            Arc::new(consumer),
            Arc::new(LoggingEventHandler),
            dead_letters.clone(),
            config.consumer.clone(),
        )
        .with_metrics(metrics.clone());
        let worker_shutdown = shutdown_rx.clone();
        background.push(tokio::spawn(async move {
            if let Err(e) = worker.run(worker_shutdown).await {
                tracing::error!(error = %e, "Consumer worker failed");
            }
        }));

        Arc::new(
            KafkaEventPublisher::new(
                events_broker,
                &config.topics.patient_events,
                config.publish.retry(),
                dead_letters,
                audit,
            )
            .with_metrics(metrics.clone()),
        )
    } else {
        tracing::warn!("Event publishing disabled, patient changes will not be emitted");
        Arc::new(DisabledEventPublisher)
    };

    // === 4. Patient lifecycle walkthrough ===
    let service = PatientService::new(
        Arc::new(InMemoryPatientRepository::new()),
        publisher,
        config.strict_validation,
    );
    if let Err(e) = demonstrate_lifecycle(&service).await {
        tracing::error!(error = %e, "Patient lifecycle walkthrough failed");
    }

    tracing::info!("Running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    // Receivers see a dropped sender as shutdown as well
    let _ = shutdown_tx.send(true);
    for task in background {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task panicked");
        }
    }

    Ok(())
}

async fn demonstrate_lifecycle(service: &PatientService) -> anyhow::Result<()> {
    let actor = Actor::new("registration-desk");

    let details = PatientDetails {
        demographics: Demographics {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            middle_name: None,
            date_of_birth: NaiveDate::from_ymd_opt(1985, 4, 12)
                .ok_or_else(|| anyhow::anyhow!("invalid date of birth"))?,
            gender: Gender::Female,
            social_security_number: Some("123-45-6789".to_string()),
            preferred_language: Some("en".to_string()),
            marital_status: None,
        },
        contact_info: Some(ContactInfo {
            email: Some("jane.doe@example.com".to_string()),
            phone_number: Some("+1-555-0100".to_string()),
            ..ContactInfo::default()
        }),
        emergency_contact: None,
    };

    let patient = service.create_patient(details.clone(), &actor).await?;
    tracing::info!(patient_id = %patient.id, "Patient registered");

    let mut updated = details;
    updated.demographics.last_name = "Smith".to_string();
    updated.emergency_contact = Some(EmergencyContact {
        name: "John Smith".to_string(),
        phone_number: "+1-555-0101".to_string(),
        email: None,
        relationship: Relationship::Spouse,
    });
    service.update_patient(&patient.id, updated, &actor).await?;

    service.deactivate_patient(&patient.id, &actor).await?;
    service.activate_patient(&patient.id, &actor).await?;

    let stats = service.statistics().await?;
    tracing::info!(total = stats.total, active = stats.active, inactive = stats.inactive, "Patient statistics");

    service
        .delete_patient(&patient.id, &actor, Some("Duplicate record"))
        .await?;
    Ok(())
}

/// Mirror the producer's circuit breaker into the state gauge
async fn report_circuit_state(client: Arc<RedpandaClient>, metrics: Arc<Metrics>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                metrics.update_circuit_breaker_state(client.circuit_state().await.as_gauge());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
