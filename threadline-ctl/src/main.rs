use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context};
use chrono::Utc;
use threadline_client::{
    api::{self, Author, Comment, PostId, UserId},
    current_user, format_relative_time, login, logout, retry, ClientConfig, CommentStore,
    FileStorage, HttpCommentSource, LoadState, RequestClient, ReqwestTransport, SessionStore,
    Transport, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY,
};
use threadline_mock_server::MockServer;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Base URL of the comments API
    #[structopt(
        long,
        env = "THREADLINE_BASE_URL",
        default_value = "http://127.0.0.1:3000/api"
    )]
    base_url: String,

    /// File the session token is kept in
    #[structopt(
        long,
        env = "THREADLINE_SESSION_FILE",
        default_value = ".threadline-session.json",
        parse(from_os_str)
    )]
    session_file: PathBuf,

    /// Talk to an in-process simulated backend instead of the network
    #[structopt(long)]
    mock: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Log in and save the session token
    Login { email: String, password: String },

    /// End the current session
    Logout,

    /// Show who the saved session belongs to
    Whoami,

    /// Print the comment thread of a post
    Comments { post_id: String },

    /// Post, reply to, like and delete a comment on a post
    Demo { post_id: String },
}

async fn current_author(client: &RequestClient) -> Author {
    if client.session().token().is_some() {
        match current_user(client).await {
            Ok(u) => {
                return Author {
                    id: u.id,
                    name: u.name,
                    avatar: None,
                }
            }
            Err(err) => tracing::warn!(?err, "could not identify current user"),
        }
    }
    Author {
        id: UserId::stub(),
        name: String::from("Anonymous"),
        avatar: None,
    }
}

async fn load(store: &CommentStore) -> anyhow::Result<()> {
    retry(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, || async {
        store.fetch().await;
        match store.state() {
            LoadState::Ready => Ok(()),
            _ => Err(store.error().unwrap_or_default()),
        }
    })
    .await
    .map_err(|msg| anyhow!("{msg}"))
    .with_context(|| format!("loading comments of post {}", store.post_id()))
}

fn print_thread(comments: &[Comment]) {
    let now = Utc::now();
    if comments.is_empty() {
        println!("No comments yet.");
    }
    for c in comments {
        println!(
            "{} · {} · {} likes",
            c.author.name,
            format_relative_time(c.created_at, now),
            c.likes
        );
        println!("    {}", c.content);
        for r in &c.replies {
            println!(
                "    ↳ {} · {} · {} likes",
                r.author.name,
                format_relative_time(r.created_at, now),
                r.likes
            );
            println!("        {}", r.content);
        }
    }
}

async fn demo(store: &CommentStore) -> anyhow::Result<()> {
    load(store).await?;

    let content = api::validate_content("  Trying out the comment store from the command line.  ")?;
    let id = store.add(content).await;
    let reply = api::validate_content("And replying to it.")?;
    store
        .reply(id, reply)
        .await
        .ok_or_else(|| anyhow!("new comment {id} vanished before the reply landed"))?;
    store.like(id).await;
    store.like(id).await;
    print_thread(&store.comments());

    let me = &store.current_author().id;
    let comments = store.comments();
    let mine = comments
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| anyhow!("new comment {id} vanished"))?;
    if !mine.can_delete(me) {
        return Err(api::Error::PermissionDenied).context("deleting the demo comment");
    }
    store.delete(id).await;
    println!();
    print_thread(&store.comments());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let session = SessionStore::new(Arc::new(FileStorage::new(opt.session_file)));
    let transport: Arc<dyn Transport> = match opt.mock {
        true => Arc::new(MockServer::new()),
        false => Arc::new(ReqwestTransport::default()),
    };
    let client = RequestClient::new(
        ClientConfig {
            base_url: opt.base_url,
            ..ClientConfig::default()
        },
        transport,
        session,
    )
    .with_default_interceptors(Arc::new(|path: &str| {
        eprintln!("Session expired, please log in again ({path})")
    }));

    match opt.cmd {
        Command::Login { email, password } => {
            let s = login(&client, &email, &password).await?;
            println!("Logged in as {} <{}>", s.user.name, s.user.email);
        }
        Command::Logout => logout(&client).await?,
        Command::Whoami => {
            let u = current_user(&client)
                .await
                .context("fetching current user")?;
            println!("{} <{}>", u.name, u.email);
        }
        Command::Comments { post_id } => {
            let author = current_author(&client).await;
            let source = HttpCommentSource::new(Arc::new(client));
            let store = CommentStore::new(PostId(post_id), author, Arc::new(source));
            load(&store).await?;
            print_thread(&store.comments());
        }
        Command::Demo { post_id } => {
            let author = current_author(&client).await;
            let source = HttpCommentSource::new(Arc::new(client));
            let store = CommentStore::new(PostId(post_id), author, Arc::new(source));
            demo(&store).await?;
        }
    }

    Ok(())
}
