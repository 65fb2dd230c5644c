use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::info;
use warp::http::StatusCode;
use warp::reply::{self, Json, WithStatus};
use warp::{Filter, Rejection};

use crate::audio::BgmCommand;
use crate::controller::{
    CommandOutcome, CommandRequest, ConfigUpdate, PlayerCommand, StatusSnapshot,
};

pub type CommandSender = mpsc::Sender<CommandRequest>;

#[derive(Debug, Deserialize, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T, message: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.to_string(),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct FolderRequest {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistPathsRequest {
    name: String,
    paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    from: String,
    to: String,
}

/// Binds the control server. The returned future serves until dropped.
pub fn bind_http_server(
    addr: SocketAddr,
    commands: CommandSender,
    status: watch::Receiver<StatusSnapshot>,
) -> Result<impl Future<Output = ()> + 'static, warp::Error> {
    let (bound, server) = warp::serve(routes(commands, status)).try_bind_ephemeral(addr)?;
    info!("Starting HTTP server on {}", bound);
    Ok(server)
}

pub fn routes(
    commands: CommandSender,
    status: watch::Receiver<StatusSnapshot>,
) -> impl Filter<Extract = impl warp::Reply, Error = Rejection> + Clone {
    let health = warp::path!("health").and(warp::get()).map(|| {
        reply::json(&ApiResponse::success("healthy", "Slideshow player is running"))
    });

    let version = warp::path!("version").and(warp::get()).map(|| {
        let version_info = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "commit_hash": env!("GIT_COMMIT_HASH"),
            "commit_short": env!("GIT_COMMIT_SHORT"),
            "branch": env!("GIT_BRANCH"),
            "build_time": env!("BUILD_TIME")
        });
        reply::json(&ApiResponse::success(version_info, "Version information"))
    });

    let status = warp::path!("status").and(warp::get()).map(move || {
        let snapshot = status.borrow().clone();
        reply::json(&ApiResponse::success(snapshot, "Status retrieved"))
    });

    let items = warp::path!("items")
        .and(warp::get())
        .and(with_commands(commands.clone()))
        .and_then(|commands: CommandSender| execute(commands, PlayerCommand::ListItems));

    let control = warp::path!("control")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: ActionRequest, commands: CommandSender| async move {
            match control_command(&req.action) {
                Ok(command) => execute(commands, command).await,
                Err(e) => Ok(respond(Err(e))),
            }
        });

    let select = warp::path!("select")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: SelectRequest, commands: CommandSender| {
            execute(commands, PlayerCommand::Select(req.index))
        });

    let config = warp::path!("config")
        .and(warp::put())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|update: ConfigUpdate, commands: CommandSender| {
            execute(commands, PlayerCommand::UpdateConfig(update))
        });

    let search = warp::path!("search")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: SearchRequest, commands: CommandSender| {
            execute(commands, PlayerCommand::Search(req.query))
        });

    let folder = warp::path!("folder")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: FolderRequest, commands: CommandSender| {
            let command = match req.path {
                Some(path) => PlayerCommand::OpenFolder(path),
                None => PlayerCommand::Rescan,
            };
            execute(commands, command)
        });

    let reload = warp::path!("reload")
        .and(warp::post())
        .and(with_commands(commands.clone()))
        .and_then(|commands: CommandSender| execute(commands, PlayerCommand::ReloadAssets));

    let bgm = warp::path!("bgm")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: ActionRequest, commands: CommandSender| async move {
            match bgm_command(&req.action) {
                Ok(command) => execute(commands, PlayerCommand::Bgm(command)).await,
                Err(e) => Ok(respond(Err(e))),
            }
        });

    let list_playlists = warp::path!("playlists")
        .and(warp::get())
        .and(with_commands(commands.clone()))
        .and_then(|commands: CommandSender| execute(commands, PlayerCommand::ListPlaylists));

    let create_playlist = warp::path!("playlists")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: NameRequest, commands: CommandSender| {
            execute(commands, PlayerCommand::CreatePlaylist(req.name))
        });

    let add_to_playlist = warp::path!("playlists" / "add")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: PlaylistPathsRequest, commands: CommandSender| {
            execute(
                commands,
                PlayerCommand::AddToPlaylist {
                    name: req.name,
                    paths: req.paths,
                },
            )
        });

    let remove_from_playlist = warp::path!("playlists" / "remove-items")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: PlaylistPathsRequest, commands: CommandSender| {
            execute(
                commands,
                PlayerCommand::RemoveFromPlaylist {
                    name: req.name,
                    paths: req.paths,
                },
            )
        });

    let delete_playlist = warp::path!("playlists" / "remove")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: NameRequest, commands: CommandSender| {
            execute(commands, PlayerCommand::DeletePlaylist(req.name))
        });

    let rename_playlist = warp::path!("playlists" / "rename")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands.clone()))
        .and_then(|req: RenameRequest, commands: CommandSender| {
            execute(
                commands,
                PlayerCommand::RenamePlaylist {
                    from: req.from,
                    to: req.to,
                },
            )
        });

    let activate_playlist = warp::path!("playlists" / "activate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_commands(commands))
        .and_then(|req: NameRequest, commands: CommandSender| {
            execute(commands, PlayerCommand::ActivatePlaylist(req.name))
        });

    let playlists = list_playlists
        .or(create_playlist)
        .or(add_to_playlist)
        .or(remove_from_playlist)
        .or(delete_playlist)
        .or(rename_playlist)
        .or(activate_playlist);

    let api = warp::path("api")
        .and(
            health
                .or(version)
                .or(status)
                .or(items)
                .or(control)
                .or(select)
                .or(config)
                .or(search)
                .or(folder)
                .or(reload)
                .or(bgm)
                .or(playlists),
        )
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "POST", "PUT"]),
        );

    let root = warp::path::end().map(|| {
        reply::html(
            r#"
            <html>
            <head><title>Slideshow Control</title></head>
            <body>
            <h1>Slideshow Player</h1>
            <p>API endpoints:</p>
            <ul>
            <li>GET /api/health - Health check</li>
            <li>GET /api/version - Version information</li>
            <li>GET /api/status - Player status</li>
            <li>GET /api/items - Files in the working view</li>
            <li>POST /api/control - start, stop, pause, resume, toggle_pause, next, previous, shutdown</li>
            <li>POST /api/select - Jump to an index</li>
            <li>PUT /api/config - Update settings</li>
            <li>POST /api/search - Filter by file name</li>
            <li>POST /api/folder - Open a folder (no path rescans)</li>
            <li>POST /api/reload - Reload sound assets</li>
            <li>POST /api/bgm - play, pause, next, previous, stop</li>
            <li>GET/POST /api/playlists - List or create playlists</li>
            <li>POST /api/playlists/{add,remove-items,remove,rename,activate}</li>
            </ul>
            </body>
            </html>
            "#,
        )
    });

    root.or(api)
}

fn with_commands(
    commands: CommandSender,
) -> impl Filter<Extract = (CommandSender,), Error = Infallible> + Clone {
    warp::any().map(move || commands.clone())
}

async fn execute(
    commands: CommandSender,
    command: PlayerCommand,
) -> Result<WithStatus<Json>, Infallible> {
    Ok(respond(send_command(&commands, command).await))
}

async fn send_command(commands: &CommandSender, command: PlayerCommand) -> CommandOutcome {
    let (request, reply) = CommandRequest::new(command);
    commands
        .send(request)
        .await
        .map_err(|e| format!("Failed to send command: {}", e))?;
    reply
        .await
        .map_err(|_| "Player stopped before answering".to_string())?
}

fn respond(outcome: CommandOutcome) -> WithStatus<Json> {
    match outcome {
        Ok(outcome) => {
            let response = ApiResponse {
                success: true,
                data: outcome.data,
                message: outcome.message,
            };
            reply::with_status(reply::json(&response), StatusCode::OK)
        }
        Err(message) => reply::with_status(
            reply::json(&ApiResponse::<()>::failure(message)),
            StatusCode::BAD_REQUEST,
        ),
    }
}

fn control_command(action: &str) -> Result<PlayerCommand, String> {
    let command = match action {
        "start" | "play" => PlayerCommand::Start,
        "stop" => PlayerCommand::Stop,
        "pause" => PlayerCommand::Pause,
        "resume" => PlayerCommand::Resume,
        "toggle_pause" => PlayerCommand::TogglePause,
        "next" => PlayerCommand::Next,
        "previous" | "prev" => PlayerCommand::Previous,
        "shutdown" => PlayerCommand::Shutdown,
        _ => return Err(format!("Unknown action: {}", action)),
    };
    Ok(command)
}

fn bgm_command(action: &str) -> Result<BgmCommand, String> {
    let command = match action {
        "play" => BgmCommand::Play,
        "pause" => BgmCommand::Pause,
        "stop" => BgmCommand::Stop,
        "next" => BgmCommand::Next,
        "previous" | "prev" => BgmCommand::Previous,
        _ => return Err(format!("Unknown BGM action: {}", action)),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::controller;
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;

    struct Server {
        commands: CommandSender,
        status: watch::Receiver<StatusSnapshot>,
        dir: tempfile::TempDir,
    }

    /// Runs a real controller behind the command channel.
    fn server(setup: impl FnOnce(&Path)) -> Server {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let mut controller = controller(dir.path());
        let (status_tx, status) = watch::channel(controller.snapshot());
        let (commands, mut rx) = mpsc::channel::<CommandRequest>(16);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                controller.handle_request(request, &status_tx);
            }
        });

        Server {
            commands,
            status,
            dir,
        }
    }

    fn media(dir: &Path) {
        let media = dir.join("media");
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("a.png"), b"x").unwrap();
        fs::write(media.join("b.png"), b"x").unwrap();
    }

    async fn call(server: &Server, method: &str, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut request = warp::test::request().method(method).path(path);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .reply(&routes(server.commands.clone(), server.status.clone()))
            .await;
        let status = response.status().as_u16();
        let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn health_uses_the_response_envelope() {
        let server = server(|_| {});
        let (status, body) = call(&server, "GET", "/api/health", None).await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"], json!("healthy"));
    }

    #[tokio::test]
    async fn unknown_action_is_rejected_without_reaching_the_player() {
        let server = server(|_| {});
        let (status, body) =
            call(&server, "POST", "/api/control", Some(json!({ "action": "dance" }))).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("Unknown action: dance"));
    }

    #[tokio::test]
    async fn start_on_empty_catalog_reports_the_error() {
        let server = server(|_| {});
        let (status, body) =
            call(&server, "POST", "/api/control", Some(json!({ "action": "start" }))).await;

        assert_eq!(status, 400);
        assert_eq!(body["message"], json!("no playable files loaded"));
    }

    #[tokio::test]
    async fn folder_then_start_is_visible_in_status() {
        let server = server(media);
        let folder = server.dir.path().join("media");

        let (status, _) =
            call(&server, "POST", "/api/folder", Some(json!({ "path": folder }))).await;
        assert_eq!(status, 200);
        let (status, _) =
            call(&server, "POST", "/api/control", Some(json!({ "action": "start" }))).await;
        assert_eq!(status, 200);

        let (_, body) = call(&server, "GET", "/api/status", None).await;
        assert_eq!(body["data"]["player"]["state"], json!("running"));
        assert_eq!(body["data"]["player"]["total_items"], json!(2));
        assert_eq!(body["data"]["player"]["current_index"], json!(0));

        let (_, body) = call(&server, "GET", "/api/items", None).await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn playlist_routes_round_trip_through_the_store() {
        let server = server(media);
        let path = server.dir.path().join("media/a.png");

        let (status, _) =
            call(&server, "POST", "/api/playlists", Some(json!({ "name": "faves" }))).await;
        assert_eq!(status, 200);
        let (status, _) = call(
            &server,
            "POST",
            "/api/playlists/add",
            Some(json!({ "name": "faves", "paths": [path] })),
        )
        .await;
        assert_eq!(status, 200);
        let (status, body) =
            call(&server, "POST", "/api/playlists", Some(json!({ "name": "faves" }))).await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], json!(false));

        let (_, body) = call(&server, "GET", "/api/playlists", None).await;
        assert_eq!(body["data"]["faves"], json!([path]));
    }

    #[tokio::test]
    async fn config_update_is_clamped() {
        let server = server(|_| {});
        let (status, _) = call(
            &server,
            "PUT",
            "/api/config",
            Some(json!({ "interval_seconds": 9999, "shuffle": true })),
        )
        .await;
        assert_eq!(status, 200);

        let (_, body) = call(&server, "GET", "/api/status", None).await;
        assert_eq!(body["data"]["player"]["interval_seconds"], json!(3600));
        assert_eq!(body["data"]["player"]["shuffle"], json!(true));
    }
}
