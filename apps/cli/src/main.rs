use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    config::{load_settings, normalize_backend_url, Settings},
    error::describe_request_failure,
    filter_by_tracking, load_parcel_views,
    order::{AddressDraft, ParcelDraft, RecipientDraft},
    parcels::list_parcels,
    ClientError, ErrorContext, FailureKind, HttpBackend, NavigationController, OrderWorkflow,
    ParcelStatusController, RouteResolver, SessionGate, ShippingBackend, ViewState,
};
use directions::{
    google::GOOGLE_MAPS_BASE_URL, DirectionsService, GoogleDirectionsClient,
    MissingDirectionsService,
};
use shared::{domain::ParcelId, protocol::UserRecord};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sendit", about = "SendIT parcel shipping client")]
struct Cli {
    /// Overrides `backend_url` from sendit.toml and the environment.
    #[arg(long)]
    backend_url: Option<String>,
    /// Signs in before running the command; the session cookie does not
    /// outlive the process.
    #[arg(long, env = "SENDIT_EMAIL")]
    email: Option<String>,
    #[arg(long, env = "SENDIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the session and print the landing view.
    Whoami,
    /// List your parcels, optionally filtered by tracking number.
    Orders {
        #[arg(long)]
        search: Option<String>,
        /// Look up the driving route for each parcel.
        #[arg(long)]
        routes: bool,
    },
    /// Run the four-step create-order wizard in one go.
    CreateOrder(OrderArgs),
    /// Driving route between two "City, Country" labels.
    Route { origin: String, destination: String },
    /// Administrators: move a parcel to Accepted, Out For Delivery or Delivered.
    SetStatus { parcel_id: i64, status: String },
    Logout,
}

#[derive(Args, Debug)]
struct OrderArgs {
    #[arg(long, default_value = "")]
    sender_street: String,
    #[arg(long)]
    sender_city: String,
    #[arg(long, default_value = "")]
    sender_state: String,
    #[arg(long, default_value = "")]
    sender_zip: String,
    #[arg(long)]
    sender_country: String,
    #[arg(long)]
    recipient_name: String,
    #[arg(long)]
    recipient_phone: String,
    #[arg(long, default_value = "")]
    recipient_street: String,
    #[arg(long)]
    recipient_city: String,
    #[arg(long, default_value = "")]
    recipient_state: String,
    #[arg(long, default_value = "")]
    recipient_zip: String,
    #[arg(long)]
    recipient_country: String,
    #[arg(long)]
    length: String,
    #[arg(long)]
    width: String,
    #[arg(long)]
    height: String,
    #[arg(long)]
    weight: String,
    #[arg(long)]
    cost: String,
    /// Delete whatever was created if a step fails.
    #[arg(long)]
    abandon_on_failure: bool,
}

impl OrderArgs {
    fn sender(&self) -> AddressDraft {
        AddressDraft {
            street: self.sender_street.clone(),
            city: self.sender_city.clone(),
            state: self.sender_state.clone(),
            zip_code: self.sender_zip.clone(),
            country: self.sender_country.clone(),
            ..AddressDraft::default()
        }
    }

    fn recipient(&self) -> RecipientDraft {
        RecipientDraft {
            full_name: self.recipient_name.clone(),
            phone_number: self.recipient_phone.clone(),
        }
    }

    fn recipient_address(&self) -> AddressDraft {
        AddressDraft {
            street: self.recipient_street.clone(),
            city: self.recipient_city.clone(),
            state: self.recipient_state.clone(),
            zip_code: self.recipient_zip.clone(),
            country: self.recipient_country.clone(),
            ..AddressDraft::default()
        }
    }

    fn parcel(&self) -> ParcelDraft {
        ParcelDraft {
            length: self.length.clone(),
            width: self.width.clone(),
            height: self.height.clone(),
            weight: self.weight.clone(),
            cost: self.cost.clone(),
        }
    }
}

fn directions_service(settings: &Settings) -> Arc<dyn DirectionsService> {
    match &settings.directions_api_key {
        None if settings.directions_base_url == GOOGLE_MAPS_BASE_URL => {
            warn!("no directions api key configured; routes are disabled");
            Arc::new(MissingDirectionsService)
        }
        key => Arc::new(GoogleDirectionsClient::with_base_url(
            settings.directions_base_url.clone(),
            key.clone(),
        )),
    }
}

async fn signed_in_user(
    backend: &Arc<HttpBackend>,
    settings: &Settings,
    nav: &mut NavigationController,
) -> Result<UserRecord> {
    let gate = SessionGate::new(backend.clone()).with_retry_policy(settings.retry_policy());
    if let ViewState::Login = nav.refresh(&gate).await {
        return Err(ClientError::new(
            FailureKind::AuthFailure,
            ErrorContext::Session,
            "not signed in; pass --email and --password",
        )
        .into());
    }
    nav.identity()
        .cloned()
        .context("session resolved without an identity")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if let Some(url) = &cli.backend_url {
        settings.backend_url = normalize_backend_url(url)?;
    }
    info!(backend_url = %settings.backend_url, "sendit: starting");

    let backend = Arc::new(HttpBackend::with_timeout(
        settings.backend_url.clone(),
        settings.request_timeout(),
    )?);

    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        backend.login(email, password).await.map_err(|err| {
            ClientError::new(
                FailureKind::AuthFailure,
                ErrorContext::Login,
                describe_request_failure(&format!("{err:#}")),
            )
        })?;
    }

    let mut nav = NavigationController::new();

    match cli.command {
        Command::Whoami => {
            let user = signed_in_user(&backend, &settings, &mut nav).await?;
            println!(
                "{} <{}> roles={:?}",
                user.full_name(),
                user.email.as_deref().unwrap_or("-"),
                user.roles
            );
            println!("landing view: {:?}", nav.view());
        }
        Command::Orders { search, routes } => {
            let user = signed_in_user(&backend, &settings, &mut nav).await?;
            let parcels = list_parcels(backend.as_ref(), &user)
                .await
                .map_err(ClientError::from)?;
            let matching: Vec<_> = filter_by_tracking(&parcels, search.as_deref().unwrap_or(""))
                .into_iter()
                .cloned()
                .collect();

            let resolver = RouteResolver::new(directions_service(&settings));
            let views = if routes {
                load_parcel_views(&resolver, matching).await
            } else {
                matching
                    .into_iter()
                    .map(|parcel| client_core::ParcelView {
                        parcel,
                        route: None,
                    })
                    .collect()
            };

            for view in views {
                let parcel = &view.parcel;
                let route = view
                    .route
                    .as_ref()
                    .map(|r| format!(" {} ({})", r.distance_text(), r.duration_text()))
                    .unwrap_or_default();
                println!(
                    "#{} {} {} {}x{}x{} {}kg{route}",
                    parcel.id,
                    parcel.tracking_number.as_deref().unwrap_or("-"),
                    parcel.status,
                    parcel.length,
                    parcel.width,
                    parcel.height,
                    parcel.weight,
                );
            }
        }
        Command::CreateOrder(args) => {
            let user = signed_in_user(&backend, &settings, &mut nav).await?;
            let mut order = OrderWorkflow::new(backend.clone(), Some(&user));

            let result = async {
                order.submit_sender_address(args.sender()).await?;
                order.submit_recipient(args.recipient()).await?;
                order.submit_recipient_address(args.recipient_address()).await?;
                order.submit_parcel(args.parcel()).await
            }
            .await;

            match result {
                Ok(_) => {
                    let parcel = order
                        .created_parcel()
                        .context("order completed without a parcel")?;
                    println!(
                        "created parcel #{} tracking={} status={}",
                        parcel.id,
                        parcel.tracking_number.as_deref().unwrap_or("-"),
                        parcel.status
                    );
                }
                Err(err) => {
                    if args.abandon_on_failure {
                        let report = order.abandon().await?;
                        for result in &report.results {
                            println!("compensated {:?}: {:?}", result.target, result.outcome);
                        }
                        if !report.untracked.is_empty() {
                            println!("left behind (no id returned): {:?}", report.untracked);
                        }
                    }
                    return Err(ClientError::from(err).into());
                }
            }
        }
        Command::Route {
            origin,
            destination,
        } => {
            let resolver = RouteResolver::new(directions_service(&settings));
            let route = resolver
                .resolve_route(&origin, &destination)
                .await
                .map_err(ClientError::from)?;
            println!(
                "{} -> {}: {} ({})",
                route.origin,
                route.destination,
                route.distance_text(),
                route.duration_text()
            );
            println!("center: {:.5},{:.5}", route.center.lat, route.center.lng);
        }
        Command::SetStatus { parcel_id, status } => {
            let user = signed_in_user(&backend, &settings, &mut nav).await?;
            let controller =
                ParcelStatusController::new(backend.clone(), &user).map_err(ClientError::from)?;
            let outcome = controller
                .set_status(ParcelId(parcel_id), &status)
                .await
                .map_err(ClientError::from)?;
            println!("parcel #{} is now {}", outcome.parcel_id, outcome.status);
            if let Some(failure) = outcome.notification_failure() {
                eprintln!("warning: {failure}");
            }
            nav.navigate(outcome.next_view()).map_err(ClientError::from)?;
            println!("next view: {:?}", nav.view());
        }
        Command::Logout => {
            signed_in_user(&backend, &settings, &mut nav).await?;
            nav.logout(backend.as_ref())
                .await
                .map_err(ClientError::from)?;
            println!("signed out");
        }
    }

    Ok(())
}
