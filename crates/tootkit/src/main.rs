use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::de::DeserializeOwned;
use tootkit::api::{ClientOptions, Endpoint, Params};
use tootkit::client::{BasicClient, basic_client};
use tootkit::output::{event_value, resource_line, stream_error_line};
use tootkit::paging::{FetchPolicy, keep};
use tootkit::streaming::{Event, Feed, ListenOptions};
use tootkit::types::{Notification, Resource, Status};
use tootkit::{Cursor, EntityId};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "tootkit - Mastodon client demo")]
struct Args {
    /// Instance URL (e.g., https://mastodon.social)
    #[arg(long, env = "TOOTKIT_INSTANCE")]
    instance: Url,

    /// Access token
    #[arg(long, env = "TOOTKIT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Streaming host, when it differs from the instance
    #[arg(long)]
    streaming_url: Option<Url>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a timeline (user, public, local, direct, :tag or !list)
    Timeline {
        #[arg(default_value = "user")]
        feed: Feed,
        /// Local posts only
        #[arg(long)]
        local: bool,
        /// Posts with media attachments only
        #[arg(long)]
        only_media: bool,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Show notifications
    Notifications {
        /// Notification type to leave out (mention, reblog, favourite, follow, ...)
        #[arg(long = "exclude", value_name = "TYPE")]
        exclude: Vec<String>,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Show favourited statuses
    Favourites {
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Show bookmarked statuses
    Bookmarks {
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Print live events as JSON lines until interrupted
    Stream {
        #[arg(default_value = "user")]
        feeds: Vec<Feed>,
    },
}

#[derive(clap::Args, Debug)]
struct PagingArgs {
    /// Page size, and the number of items to collect
    #[arg(long)]
    limit: Option<u32>,
    /// Only items newer than this id
    #[arg(long)]
    since_id: Option<String>,
    /// Only items older than this id
    #[arg(long)]
    max_id: Option<String>,
    /// Follow every page the server offers
    #[arg(long)]
    all: bool,
    /// Print at most this many items
    #[arg(long)]
    keep: Option<usize>,
}

impl PagingArgs {
    fn policy(&self) -> FetchPolicy {
        FetchPolicy::new()
            .maybe_quota(self.limit.map(|limit| limit as usize))
            .fetch_all(self.all)
            .start(Cursor {
                since_id: self.since_id.as_deref().map(EntityId::new),
                min_id: None,
                max_id: self.max_id.as_deref().map(EntityId::new),
                limit: self.limit,
            })
            .build()
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(EnvFilter::from_env("TOOTKIT_LOG"))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let options = ClientOptions::new()
        .maybe_streaming_base(args.streaming_url)
        .build();
    let client = basic_client(args.instance, args.token.as_deref(), options);

    match args.command {
        Command::Timeline {
            feed,
            local,
            only_media,
            paging,
        } => {
            let (endpoint, mut params) = feed.with_local(local).timeline();
            params.extend(Params::new().flag("only_media", only_media));
            list::<Status>(&client, endpoint, params, &paging).await
        }
        Command::Notifications { exclude, paging } => {
            let mut params = Params::new();
            for kind in exclude {
                params.push("exclude_types[]", kind);
            }
            list::<Notification>(&client, Endpoint::notifications(), params, &paging).await
        }
        Command::Favourites { paging } => {
            list::<Status>(&client, Endpoint::favourites(), Params::new(), &paging).await
        }
        Command::Bookmarks { paging } => {
            list::<Status>(&client, Endpoint::bookmarks(), Params::new(), &paging).await
        }
        Command::Stream { feeds } => stream(&client, feeds).await,
    }
}

/// Fetch, trim and print. A failure after the first page still prints what was fetched.
async fn list<T>(
    client: &BasicClient,
    endpoint: Endpoint,
    params: Params,
    paging: &PagingArgs,
) -> miette::Result<()>
where
    T: DeserializeOwned + Send + Into<Resource>,
{
    let fetched = client
        .fetch_paged::<T>(&endpoint, &params, &paging.policy())
        .await;
    let (mut items, failure) = match fetched {
        Ok(items) => (items, None),
        Err(e) => {
            let pages = e.pages();
            let (partial, error) = e.into_parts();
            (partial, Some((pages, error)))
        }
    };

    keep(&mut items, paging.keep);
    let printed = items.len();
    for item in items {
        println!("{}", resource_line(&item.into()).into_diagnostic()?);
    }

    match failure {
        None => Ok(()),
        Some((0, error)) => Err(error.into()),
        Some((pages, error)) => Err(miette::Report::new(error).wrap_err(format!(
            "stopped after {pages} page(s); {printed} item(s) printed"
        ))),
    }
}

async fn stream(client: &BasicClient, feeds: Vec<Feed>) -> miette::Result<()> {
    let mut listener = client.listen(feeds, ListenOptions::default()).await?;
    let cancel = listener.cancel_handle();
    let done = listener.done();

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                tracing::info!("interrupted, closing streams");
                cancel.cancel();
                break;
            }
            event = listener.next_event() => match event {
                Some(Event::Error(error)) => eprintln!("{}", stream_error_line(&error)),
                Some(event) => println!("{}", event_value(event)),
                None => break,
            },
        }
    }

    done.wait().await;
    Ok(())
}
