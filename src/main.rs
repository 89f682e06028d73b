mod database;
mod error;
mod filesystem;
mod models;
mod services;

use error::AppError;
use models::SyncSettings;
use services::photo_store::FilePhotoStore;
use services::record_store::SqliteRecordStore;
use services::{background_sync, photo_service, sync_service};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime");

    if let Err(e) = runtime.block_on(run(command, rest)) {
        log::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(command: &str, args: &[String]) -> Result<(), AppError> {
    match command {
        "sync" => {
            let outcome = background_sync::sync_now().await?;
            println!("{}", outcome.message);
            if !outcome.success {
                return Err(AppError::Other(outcome.message));
            }
            Ok(())
        }
        "import" => {
            if args.is_empty() {
                return Err(AppError::Validation(
                    "import needs at least one file path".to_string(),
                ));
            }
            let conn = database::init_database()?;
            let records = SqliteRecordStore::new(conn);
            let photos = FilePhotoStore::new(filesystem::get_storage_root());

            for path in args {
                let uuid = photo_service::import_photo(&records, &photos, path).await?;
                println!("Imported {} as {}", path, uuid);
            }
            Ok(())
        }
        "status" => {
            let conn = database::init_database()?;
            let settings = sync_service::load_sync_settings(&conn)?;
            let records = SqliteRecordStore::new(conn);

            use photo_sync::RecordStore;
            let meta = records.get_sync_metadata().await?;
            let photos = photo_service::count_photos(&records).await?;

            println!("Photos: {}", photos);
            match settings {
                Some(settings) => {
                    println!(
                        "Server: {} ({})",
                        settings.server_url,
                        if settings.enabled { "enabled" } else { "disabled" }
                    );
                }
                None => println!("Server: not configured"),
            }
            println!("Last sequence: {}", meta.last_sequence);
            println!(
                "Last session: {}",
                meta.last_session_id.as_deref().unwrap_or("-")
            );
            match meta.last_sync {
                Some(at) => println!("Last sync: {}", at.to_rfc3339()),
                None => println!("Last sync: never"),
            }
            Ok(())
        }
        "watch" => {
            background_sync::start_background_sync();
            println!(
                "Background sync running every {} seconds. Ctrl-C to quit.",
                background_sync::sync_interval_seconds()
            );

            let mut progress = background_sync::subscribe_sync_progress();
            loop {
                if progress.changed().await.is_err() {
                    return Ok(());
                }
                let Some(event) = progress.borrow_and_update().clone() else {
                    continue;
                };
                println!(
                    "[{:>3.0}%] {} ({}/{})",
                    event.percentage, event.phase, event.current, event.total
                );
                if matches!(
                    event.phase,
                    photo_sync::SyncPhase::Completed | photo_sync::SyncPhase::Failed
                ) {
                    if let Some(entry) = background_sync::get_sync_log().last() {
                        let state = if entry.success { "ok" } else { "failed" };
                        println!("{} ({}): {}", state, entry.ts_ms, entry.message);
                    }
                    if let Some(eta) = background_sync::next_sync_eta_seconds() {
                        println!("Next sync in {}s", eta);
                    }
                }
            }
        }
        "configure" => {
            let [server_url, username, app_password, remote_path] = args else {
                return Err(AppError::Validation(
                    "configure needs <server-url> <username> <app-password> <remote-path>"
                        .to_string(),
                ));
            };
            let conn = database::init_database()?;
            let settings = SyncSettings::new(
                server_url.clone(),
                username.clone(),
                app_password.clone(),
                remote_path.clone(),
            );
            sync_service::save_sync_settings(&conn, &settings)?;
            println!("Sync settings saved for {}", server_url);
            Ok(())
        }
        "enable" | "disable" => {
            let enabled = command == "enable";
            let conn = database::init_database()?;
            sync_service::set_sync_enabled(&conn, enabled)?;
            println!("Sync {}", if enabled { "enabled" } else { "disabled" });
            Ok(())
        }
        "unlink" => {
            let conn = database::init_database()?;
            sync_service::delete_sync_settings(&conn)?;
            println!("Sync settings removed");
            Ok(())
        }
        _ => {
            println!("photovault - photo management with offline-first sync");
            println!();
            println!("Usage: photovault <command>");
            println!("  sync                                                  reconcile with the server");
            println!("  watch                                                 sync periodically in the foreground");
            println!("  import <file>...                                      add photos to the library");
            println!("  status                                                show library and sync state");
            println!("  configure <server-url> <user> <password> <path>       set up the server connection");
            println!("  enable | disable                                      toggle synchronization");
            println!("  unlink                                                remove the server connection");
            Ok(())
        }
    }
}
