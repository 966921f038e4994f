use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use consulta::api::{HttpRemoteStore, SessionContext};
use consulta::attachments::{AttachmentManager, FsPreviewStore, LocalFile};
use consulta::config::Config;
use consulta::notify::{ChannelNotifier, Notice, NoticeKind};
use consulta::registry::SessionRegistry;
use consulta::session::{SessionMode, DEFAULT_SESSION_TITLE};
use consulta::sync::SyncController;
use consulta::{logger, ChatMessage, MessageRole};

#[derive(Parser, Debug)]
#[command(name = "consulta", about = "Chat client for the remote consultation store")]
struct Args {
    /// Remote store endpoint, e.g. https://consulta.example
    #[arg(long)]
    endpoint: Option<String>,

    /// User the sessions belong to
    #[arg(long)]
    user: Option<String>,

    /// Session category: general or clinical
    #[arg(long)]
    mode: Option<String>,

    /// Open a specific session id on startup
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = logger::init_global_logger() {
        eprintln!("warning: logging disabled: {}", e);
    }

    let mut config = Config::load_or_default();
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(user) = args.user {
        config.user = user;
    }
    if let Some(mode) = args.mode {
        config.mode = mode.parse::<SessionMode>().map_err(anyhow::Error::msg)?;
    }

    let client = Arc::new(HttpRemoteStore::new(&config.endpoint)?);
    let (notifier, mut notices) = ChannelNotifier::new();
    let registry = SessionRegistry::shared();
    let controller = SyncController::new(
        registry.clone(),
        client,
        Arc::new(notifier),
        SessionContext {
            user: config.user.clone(),
            mode: config.mode,
        },
        &config.timing,
    );
    let mut attachments = AttachmentManager::new(Arc::new(FsPreviewStore::new()?));

    // Initial load; a failure is already surfaced as a notice and the
    // empty registry stays usable.
    let _ = controller.load_sessions().await;

    match args.session {
        Some(route_id) => controller.adopt_session(&route_id).await,
        None => {
            let first = registry.lock().await.sessions().first().map(|s| s.id.clone());
            match first {
                Some(id) => {
                    controller.select_session(&id).await;
                }
                None => {
                    let _ = controller.create_session_optimistic(DEFAULT_SESSION_TITLE).await;
                }
            }
        }
    }

    println!("consulta — escribe un mensaje, /help para comandos");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        drain_notices(&mut notices);
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        match line.split_whitespace().next().unwrap_or_default() {
            "/quit" => break,
            "/help" => print_help(),
            "/sessions" => {
                let registry = registry.lock().await;
                for session in registry.sessions() {
                    let marker = if registry.active_id() == Some(session.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{} {}  {}", marker, session.id, session.title);
                }
            }
            "/new" => {
                if let Ok(id) = controller.create_session_optimistic(DEFAULT_SESSION_TITLE).await {
                    println!("nueva conversación: {}", id);
                }
            }
            "/open" => match line.split_whitespace().nth(1) {
                Some(id) => controller.adopt_session(id).await,
                None => println!("uso: /open <session-id>"),
            },
            "/clear-chats" => {
                controller.delete_all_sessions().await;
                // Never leave the user without a session for long.
                tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                let _ = controller.create_session_optimistic(DEFAULT_SESSION_TITLE).await;
            }
            "/attach" => match line.split_whitespace().nth(1) {
                Some(path) => attach_file(&mut attachments, path),
                None => println!("uso: /attach <ruta>"),
            },
            "/detach" => {
                attachments.clear_batch();
                println!("adjuntos descartados");
            }
            "/upload" => {
                let active = registry.lock().await.active_id().map(str::to_string);
                match (active, attachments.first_outgoing()) {
                    (Some(session_id), Some(file)) => {
                        if let Ok(documents) = controller.upload_document(&session_id, &file).await {
                            attachments.clear_batch();
                            println!("documentos pendientes: {}", documents.len());
                        }
                    }
                    (None, _) => println!("no hay conversación activa"),
                    (_, None) => println!("no hay adjuntos; usa /attach"),
                }
            }
            _ => {
                let active = registry.lock().await.active_id().map(str::to_string);
                let Some(session_id) = active else {
                    println!("no hay conversación activa; usa /new");
                    continue;
                };
                let outgoing = attachments.first_outgoing();
                if controller.send_message(&session_id, &line, outgoing).await.is_ok() {
                    attachments.clear_batch();
                    let registry = registry.lock().await;
                    if let Some(session) = registry.get(&session_id) {
                        if let Some(reply) = session
                            .messages
                            .iter()
                            .rev()
                            .find(|m| m.role == MessageRole::Bot)
                        {
                            print_reply(reply);
                        }
                    }
                }
            }
        }
    }

    attachments.clear_batch();
    Ok(())
}

fn drain_notices(notices: &mut mpsc::UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        match notice.kind {
            NoticeKind::Error => eprintln!("! {}", notice.text),
            NoticeKind::Info => println!("- {}", notice.text),
        }
    }
}

fn print_reply(reply: &ChatMessage) {
    if let Some(reasoning) = &reply.reasoning {
        if !reasoning.is_empty() {
            println!("  [razonamiento] {}", reasoning);
        }
    }
    println!("> {}", reply.content);
}

fn attach_file(attachments: &mut AttachmentManager, path: &str) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("no se pudo leer {}: {}", path, e);
            return;
        }
    };
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    let file = LocalFile {
        name: name.clone(),
        content_type: None,
        bytes,
    };

    let is_document = name.to_lowercase().ends_with(".pdf");
    let accepted = if is_document {
        attachments.select_documents(vec![file])
    } else {
        attachments.select_images(vec![file])
    };
    if accepted.is_empty() {
        // Disallowed types are dropped without user feedback.
        logger::debug(&format!("attachment dropped by allow-list: {}", name));
    } else {
        println!("adjunto listo: {}", accepted[0].name);
    }
}

fn print_help() {
    println!("/sessions          listar conversaciones");
    println!("/new               crear conversación");
    println!("/open <id>         abrir conversación por id");
    println!("/attach <ruta>     adjuntar imagen (jpeg/png) o pdf");
    println!("/detach            descartar adjuntos");
    println!("/upload            subir el adjunto como documento");
    println!("/clear-chats       borrar todas las conversaciones");
    println!("/quit              salir");
}
