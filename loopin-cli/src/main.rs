use std::fs;
use std::io;
use std::path::Path;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use loopin_client::{
    ClientError, ComplaintDraft, FeedOrdering, FeedState, ImageAttachment, LoopInClient,
    MediaAttachment, MediaKind, PostDraft, PostFeed, SessionContext, Settings,
    backend::{HttpAuth, HttpBlobStore, HttpStore, RealtimeStore},
};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing_subscriber::{EnvFilter, fmt};

const SESSION_FILE: &str = ".loopin_session";
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

type HttpClient = LoopInClient<HttpAuth, HttpStore, HttpBlobStore>;

#[derive(Debug, Parser)]
#[command(name = "loopin-cli", version, about = "Command-line client for the LoopIn service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign into an existing account.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the stored session.
    Logout,
    /// List your complaints, newest first.
    Complaints,
    /// Submit a complaint, optionally with a media file.
    SubmitComplaint {
        #[arg(long)]
        title: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        description: String,
        /// Path to a photo or video file.
        #[arg(long)]
        media: Option<String>,
        /// "photo" or "video"; required with --media.
        #[arg(long)]
        media_kind: Option<String>,
    },
    /// Show the community feed.
    Feed {
        /// Order by like count instead of recency.
        #[arg(long)]
        trending: bool,
    },
    /// Publish a post, optionally with an image file.
    Post {
        #[arg(long)]
        text: String,
        #[arg(long)]
        image: Option<String>,
    },
    /// Like a post by id.
    Like {
        #[arg(long)]
        id: String,
    },
    /// Show the signed-in user's profile.
    Profile,
    /// Upload a new profile image.
    SetAvatar {
        #[arg(long)]
        image: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    user_id: String,
    id_token: String,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    init_logging(&settings.log_level)?;

    let client = LoopInClient::over_http(&settings);

    match Cli::parse().command {
        Command::Register {
            name,
            email,
            password,
        } => {
            let session = client
                .register(&name, &email, &password)
                .await
                .map_err(map_client_error)?;
            persist_session(&session).context("failed to save session")?;
            println!("Registered and signed in as {}", session.user_id());
        }
        Command::Login { email, password } => {
            let session = client
                .sign_in(&email, &password)
                .await
                .map_err(map_client_error)?;
            persist_session(&session).context("failed to save session")?;
            println!("Signed in as {}", session.user_id());
        }
        Command::Logout => {
            if let Some(session) = resume_session(&client).await? {
                client.sign_out(session).await.map_err(map_client_error)?;
            }
            forget_session().context("failed to remove session file")?;
            println!("Signed out");
        }
        Command::Complaints => {
            let session = resume_session(&client).await?;
            let mut feed = client
                .my_complaints(session.as_ref())
                .await
                .map_err(map_client_error)?;

            let mut rx = feed.watch();
            let state = first_snapshot(&mut rx).await?;
            feed.close();
            match state {
                FeedState::Loaded(list) => {
                    println!("Complaints: {}", list.total);
                    for complaint in &list.complaints {
                        let created = complaint
                            .created_at
                            .format("%Y-%m-%d %H:%M")
                            .to_string();
                        println!(
                            "- [{}] {} at {} ({created}, {:?})",
                            complaint.id, complaint.title, complaint.address, complaint.status
                        );
                        if let Some(media) = &complaint.media {
                            println!("    media: {} ({:?})", media.url, media.kind);
                        }
                    }
                }
                FeedState::Failed(message) => return Err(anyhow!("feed failed: {message}")),
                FeedState::Loading => unreachable!("first_snapshot never returns Loading"),
            }
        }
        Command::SubmitComplaint {
            title,
            address,
            description,
            media,
            media_kind,
        } => {
            let session = resume_session(&client).await?;
            let media = load_media(media.as_deref(), media_kind.as_deref())?;
            let draft = ComplaintDraft {
                title,
                address,
                description,
                media,
            };
            let id = client
                .submit_complaint(session.as_ref(), &draft)
                .await
                .map_err(map_client_error)?;
            println!("Complaint submitted: {id}");
        }
        Command::Feed { trending } => {
            let ordering = if trending {
                FeedOrdering::Trending
            } else {
                FeedOrdering::Newest
            };
            let mut feed = client
                .community_feed(ordering)
                .await
                .map_err(map_client_error)?;

            let mut rx = feed.watch();
            let state = first_snapshot(&mut rx).await?;
            feed.close();
            match state {
                FeedState::Loaded(posts) => {
                    println!("Posts: {}", posts.len());
                    for post in &posts {
                        println!(
                            "- [{}] {}: {} (likes={}, comments={})",
                            post.id, post.user_name, post.text, post.likes, post.comments
                        );
                    }
                }
                FeedState::Failed(message) => return Err(anyhow!("feed failed: {message}")),
                FeedState::Loading => unreachable!("first_snapshot never returns Loading"),
            }
        }
        Command::Post { text, image } => {
            let session = resume_session(&client).await?;
            let draft = PostDraft {
                text,
                image: load_image(image.as_deref())?,
            };
            let id = client
                .submit_post(session.as_ref(), &draft)
                .await
                .map_err(map_client_error)?;
            println!("Post published: {id}");
        }
        Command::Like { id } => {
            let mut feed = client
                .community_feed(FeedOrdering::Newest)
                .await
                .map_err(map_client_error)?;
            let mut rx = feed.watch();
            first_snapshot(&mut rx).await?;

            like_and_wait(&feed, &id).await?;
            feed.close();
            println!("Liked {id}");
        }
        Command::Profile => {
            let session = resume_session(&client).await?;
            let session = session.ok_or(ClientError::Unauthenticated).map_err(map_client_error)?;

            // Give the first profile snapshot a moment to arrive.
            let mut rx = session.watch_profile();
            let _ = timeout(Duration::from_secs(2), rx.changed()).await;

            let profile = session.profile();
            println!("user_id: {}", session.user_id());
            println!("name: {}", profile.name);
            println!("email: {}", profile.email);
            if let Some(created) = profile.created_at {
                println!("member since: {}", created.format("%Y-%m-%d"));
            }
            if let Some(image) = &profile.profile_image {
                println!("avatar: {image}");
            }
        }
        Command::SetAvatar { image } => {
            let session = resume_session(&client).await?;
            let image = load_image(Some(&image))?
                .ok_or_else(|| anyhow!("failed to read the image file"))?;
            let url = client
                .update_profile_image(session.as_ref(), &image)
                .await
                .map_err(map_client_error)?;
            println!("Avatar updated: {url}");
        }
    }

    Ok(())
}

fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(())
}

/// Waits for the first non-loading feed state.
async fn first_snapshot<T: Clone>(
    rx: &mut tokio::sync::watch::Receiver<FeedState<T>>,
) -> Result<FeedState<T>> {
    loop {
        if !matches!(&*rx.borrow(), FeedState::Loading) {
            return Ok(rx.borrow().clone());
        }
        timeout(FIRST_SNAPSHOT_TIMEOUT, rx.changed())
            .await
            .map_err(|_| anyhow!("timed out waiting for the first snapshot"))?
            .map_err(|_| anyhow!("feed closed before the first snapshot"))?;
    }
}

async fn like_and_wait<S: RealtimeStore>(feed: &PostFeed<S>, id: &str) -> Result<()> {
    let handle = feed
        .like(id)
        .ok_or_else(|| anyhow!("post not found: {id}"))?;
    handle.await.context("like write task failed")?;
    Ok(())
}

fn load_media(
    path: Option<&str>,
    kind: Option<&str>,
) -> Result<Option<MediaAttachment>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let kind = parse_media_kind(kind.unwrap_or("photo"))?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {path}"))?;
    Ok(Some(MediaAttachment {
        bytes: Bytes::from(bytes),
        content_type: guess_content_type(path).to_string(),
        kind,
        file_extension: file_extension(path),
    }))
}

fn load_image(path: Option<&str>) -> Result<Option<ImageAttachment>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = fs::read(path).with_context(|| format!("failed to read {path}"))?;
    Ok(Some(ImageAttachment {
        bytes: Bytes::from(bytes),
        content_type: guess_content_type(path).to_string(),
    }))
}

fn parse_media_kind(raw: &str) -> Result<MediaKind> {
    match raw {
        "photo" => Ok(MediaKind::Photo),
        "video" => Ok(MediaKind::Video),
        other => Err(anyhow!("unknown media kind: {other} (expected photo or video)")),
    }
}

fn file_extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("bin")
        .to_ascii_lowercase()
}

fn guess_content_type(path: &str) -> &'static str {
    match file_extension(path).as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

fn parse_session_content(raw: &str) -> Option<StoredSession> {
    let session = serde_json::from_str::<StoredSession>(raw).ok()?;
    if session.user_id.is_empty() || session.id_token.is_empty() {
        return None;
    }
    Some(session)
}

fn load_session() -> io::Result<Option<StoredSession>> {
    if !Path::new(SESSION_FILE).exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(SESSION_FILE)?;
    Ok(parse_session_content(&raw))
}

fn persist_session(session: &SessionContext) -> Result<()> {
    let stored = StoredSession {
        user_id: session.user_id().to_string(),
        id_token: session.id_token().to_string(),
    };
    fs::write(SESSION_FILE, serde_json::to_string(&stored)?)?;
    Ok(())
}

fn forget_session() -> io::Result<()> {
    if Path::new(SESSION_FILE).exists() {
        fs::remove_file(SESSION_FILE)?;
    }
    Ok(())
}

/// Reopens the persisted session, if any. Commands that require one get
/// a clean `Unauthenticated` error from the library.
async fn resume_session(client: &HttpClient) -> Result<Option<SessionContext>> {
    let Some(stored) = load_session().context("failed to read .loopin_session")? else {
        return Ok(None);
    };
    let session = client
        .resume(&stored.user_id, &stored.id_token)
        .await
        .map_err(map_client_error)?;
    Ok(Some(session))
}

fn map_client_error(err: ClientError) -> anyhow::Error {
    match &err {
        ClientError::Unauthenticated => anyhow!(
            "not signed in: run `loopin-cli login ...` or `loopin-cli register ...`"
        ),
        _ => anyhow!("{}", err.user_message()),
    }
}
