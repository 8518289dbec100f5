use tokenward::app::App;
use tokenward::application_impl::JwtClaimsDecoder;
use tokenward::application_port::*;
use tokenward::domain_model::*;
use tokenward::logger::*;
use tokenward::settings::*;
use tokio::signal;

fn expiry_arg(raw: Option<String>) -> Option<ExpiryValue> {
    raw.map(|raw| match raw.trim().parse::<f64>() {
        Ok(secs) => ExpiryValue::EpochSeconds(secs),
        Err(_) => ExpiryValue::Text(raw),
    })
}

async fn print_status(app: &App) {
    let session = &app.session;
    println!("state: {}", session.state().await);

    match session.access_token().await {
        Some(token) => match JwtClaimsDecoder::new().decode(token.as_str()) {
            Ok(claims) => println!("subject: {}", claims.subject),
            Err(e) => println!("subject: <undecodable: {}>", e),
        },
        None => println!("access token: <none>"),
    }
    println!(
        "refresh token: {}",
        if session.refresh_token().await.is_some() { "present" } else { "<none>" }
    );
    for field in [TokenField::AccessTokenExpiry, TokenField::RefreshTokenExpiry] {
        match session.token_expiry(field).await {
            Some(at) => println!("{}: {}", field, canonical_iso(&at)),
            None => println!("{}: <none>", field),
        }
    }
}

async fn watch(app: &App) -> anyhow::Result<()> {
    app.start_clock_sync().await;

    let mut events = app.session.subscribe();
    let watcher = app.watcher();
    let run = watcher.run();
    tokio::pin!(run);

    loop {
        tokio::select! {
            exit = &mut run => {
                info!("watcher stopped: {:?}", exit);
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Cleared(reason)) => warn!("session cleared: {:?}", reason),
                Ok(event) => info!("session event: {:?}", event),
                Err(e) => debug!("event stream: {}", e),
            },
            _ = signal::ctrl_c() => {
                info!("interrupted");
                app.cancellation_token().cancel();
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    debug!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    let app = App::try_new(&project_settings).await?;

    let result = match cli.command {
        Command::Status => {
            print_status(&app).await;
            Ok(())
        }
        Command::Login {
            access_token,
            refresh_token,
            access_expiry,
            refresh_expiry,
        } => app
            .session
            .start_session(TokenPairUpdate {
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                access_token_expiry: expiry_arg(access_expiry),
                refresh_token_expiry: expiry_arg(refresh_expiry),
            })
            .await
            .map_err(anyhow::Error::from),
        Command::Validate => app
            .session
            .validate_and_refresh_token()
            .await
            .map(|token| println!("{}", token.as_str()))
            .map_err(anyhow::Error::from),
        Command::Refresh => app
            .session
            .refresh_access_token()
            .await
            .map(|token| println!("{}", token.as_str()))
            .map_err(anyhow::Error::from),
        Command::Watch => watch(&app).await,
        Command::Logout => {
            app.session.logout().await;
            Ok(())
        }
    };

    app.shutdown().await;
    result
}
