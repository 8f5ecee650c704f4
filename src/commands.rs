//! User-facing replies for the subscription commands.
//!
//! Each handler turns a service result into the text shown to whoever issued
//! the command. Unexpected failures are logged and replaced by a generic
//! message so internal details never reach the channel.
use crate::error::{Error, HttpCategory};
use crate::service::FeedService;
use crate::shutdown::ShutdownSignal;
use crate::util::{validate_url, HostPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub is_error: bool,
}

impl Reply {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// One command read from a line-oriented command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Subscribe {
        server_id: String,
        channel_id: String,
        link: String,
        collection_name: String,
    },
    Unsubscribe {
        server_id: String,
        collection_name: String,
    },
    Test {
        server_id: String,
        collection_name: String,
    },
    Complete {
        server_id: String,
        input: String,
    },
    List {
        server_id: String,
    },
}

const USAGE: &str = "Commands: subscribe <server> <channel> <link> <collection> | \
unsubscribe <server> <collection> | test <server> <collection> | \
complete <server> [query] | list <server>";

impl Request {
    /// Parse a whitespace-separated command line.
    ///
    /// Collection names and autocomplete queries are the rest of the line and
    /// may contain spaces:
    ///
    /// ```text
    /// subscribe <server> <channel> <link> <collection>
    /// unsubscribe <server> <collection>
    /// test <server> <collection>
    /// complete <server> [query]
    /// list <server>
    /// ```
    ///
    /// Errors carry the text to reply with.
    pub fn parse(line: &str) -> Result<Self, String> {
        let (command, rest) = next_word(line).ok_or_else(|| USAGE.to_string())?;
        let (server_id, rest) = next_word(rest).ok_or_else(|| USAGE.to_string())?;
        let server_id = server_id.to_string();
        let rest = rest.trim();

        let request = match command.to_ascii_lowercase().as_str() {
            "subscribe" => {
                let (channel_id, rest) = next_word(rest).ok_or_else(|| USAGE.to_string())?;
                let (link, collection_name) = next_word(rest).ok_or_else(|| USAGE.to_string())?;
                let collection_name = collection_name.trim();
                if collection_name.is_empty() {
                    return Err(USAGE.to_string());
                }
                Request::Subscribe {
                    server_id,
                    channel_id: channel_id.to_string(),
                    link: link.to_string(),
                    collection_name: collection_name.to_string(),
                }
            }
            "unsubscribe" if !rest.is_empty() => Request::Unsubscribe {
                server_id,
                collection_name: rest.to_string(),
            },
            "test" if !rest.is_empty() => Request::Test {
                server_id,
                collection_name: rest.to_string(),
            },
            "complete" => Request::Complete {
                server_id,
                input: rest.to_string(),
            },
            "list" if rest.is_empty() => Request::List { server_id },
            _ => return Err(USAGE.to_string()),
        };
        Ok(request)
    }
}

/// Split off the first whitespace-delimited word.
fn next_word(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    Some(s.split_once(char::is_whitespace).unwrap_or((s, "")))
}

pub struct Commands<'a> {
    service: &'a FeedService,
    host_policy: HostPolicy,
}

impl<'a> Commands<'a> {
    pub fn new(service: &'a FeedService, host_policy: HostPolicy) -> Self {
        Self {
            service,
            host_policy,
        }
    }

    pub fn service(&self) -> &FeedService {
        self.service
    }

    /// Parse and run one command line. See [`Request::parse`] for the syntax.
    pub async fn execute(&self, line: &str, signal: &ShutdownSignal) -> Reply {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(usage) => return Reply::error(usage),
        };
        tracing::debug!(request = ?request, "Running command");

        match request {
            Request::Subscribe {
                server_id,
                channel_id,
                link,
                collection_name,
            } => {
                self.subscribe(&server_id, &channel_id, &collection_name, &link)
                    .await
            }
            Request::Unsubscribe {
                server_id,
                collection_name,
            } => self.unsubscribe(&server_id, &collection_name).await,
            Request::Test {
                server_id,
                collection_name,
            } => self.test(&server_id, &collection_name, signal).await,
            Request::Complete { server_id, input } => self.complete(&server_id, &input).await,
            Request::List { server_id } => self.list(&server_id).await,
        }
    }

    pub async fn subscribe(
        &self,
        server_id: &str,
        channel_id: &str,
        collection_name: &str,
        link: &str,
    ) -> Reply {
        let collection_name = collection_name.trim();
        if collection_name.is_empty() {
            return Reply::error("Collection name must not be empty.");
        }

        let url = match validate_url(link, self.host_policy) {
            Ok(url) => url,
            Err(e) => return Reply::error(format!("Invalid feed link: {e}")),
        };

        match self
            .service
            .subscribe(&url, server_id, channel_id, collection_name)
            .await
        {
            Ok(_) => Reply::ok(format!("Subscribed \"{collection_name}\" to {url}")),
            Err(Error::AlreadyExists) => Reply::error(format!(
                "Collection \"{collection_name}\" already exists on this server."
            )),
            Err(Error::NotAValidFeed) => {
                Reply::error("That link does not point to an RSS, Atom or JSON feed.")
            }
            Err(Error::Fetch(e)) => Reply::error(format!("Could not reach the feed: {e}")),
            Err(e @ Error::Http { .. }) => Reply::error(http_failure(&e)),
            Err(e) => internal_error("subscribe", e),
        }
    }

    pub async fn unsubscribe(&self, server_id: &str, collection_name: &str) -> Reply {
        let collection_name = collection_name.trim();
        match self.service.unsubscribe(server_id, collection_name).await {
            Ok(()) => Reply::ok(format!("Unsubscribed \"{collection_name}\".")),
            Err(Error::NotFound) => unknown_collection(collection_name),
            Err(e) => internal_error("unsubscribe", e),
        }
    }

    pub async fn test(
        &self,
        server_id: &str,
        collection_name: &str,
        signal: &ShutdownSignal,
    ) -> Reply {
        let collection_name = collection_name.trim();
        match self
            .service
            .latest_link(server_id, collection_name, signal)
            .await
        {
            Ok(link) => Reply::ok(link),
            Err(Error::NotFound) => unknown_collection(collection_name),
            Err(Error::EmptyFeed) => Reply::error(format!(
                "Collection \"{collection_name}\" has no items yet."
            )),
            Err(Error::Canceled) => Reply::error("Canceled."),
            Err(e) => internal_error("test", e),
        }
    }

    /// One suggestion per line.
    pub async fn complete(&self, server_id: &str, input: &str) -> Reply {
        match self.service.autocomplete(server_id, input).await {
            Ok(names) if names.is_empty() => Reply::ok("No matching collections."),
            Ok(names) => Reply::ok(names.join("\n")),
            Err(e) => internal_error("complete", e),
        }
    }

    pub async fn list(&self, server_id: &str) -> Reply {
        match self.service.subscriptions(server_id).await {
            Ok(subs) if subs.is_empty() => Reply::ok("No subscriptions."),
            Ok(subs) => Reply::ok(
                subs.iter()
                    .map(|s| format!("{} -> #{}", s.collection_name, s.channel_id))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Err(e) => internal_error("list", e),
        }
    }
}

fn http_failure(err: &Error) -> String {
    let status = match err {
        Error::Http { status } => *status,
        _ => 0,
    };
    match err.http_category() {
        Some(HttpCategory::AuthRequired) => {
            format!("The feed requires authentication (HTTP {status}).")
        }
        Some(HttpCategory::Forbidden) => format!("Access to the feed is forbidden (HTTP {status})."),
        Some(HttpCategory::NotFound) => format!("The feed was not found (HTTP {status})."),
        Some(HttpCategory::ServerError) => {
            format!("The feed host is having trouble (HTTP {status}). Try again later.")
        }
        Some(HttpCategory::Other) | None => format!("The feed host returned HTTP {status}."),
    }
}

fn unknown_collection(collection_name: &str) -> Reply {
    Reply::error(format!("No collection named \"{collection_name}\"."))
}

fn internal_error(command: &str, err: Error) -> Reply {
    tracing::error!(command = %command, error = %err, "Command failed");
    Reply::error("Something went wrong. Check the logs for details.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogDelivery;
    use crate::service::ServiceSettings;
    use crate::storage::Database;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Blog</title>
<item><title>One</title><link>https://blog.example.com/one</link><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

    async fn service() -> FeedService {
        let db = Database::open(":memory:").await.unwrap();
        let settings = ServiceSettings {
            rate_interval: Duration::from_millis(1),
            ..ServiceSettings::default()
        };
        FeedService::new(db, reqwest::Client::new(), Arc::new(LogDelivery), settings)
    }

    async fn feed_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;
        for status in [401u16, 403, 404, 502, 418] {
            Mock::given(method("GET"))
                .and(path(format!("/status/{status}")))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }
        server
    }

    #[tokio::test]
    async fn test_subscribe_then_duplicate() {
        let server = feed_server().await;
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);
        let link = format!("{}/feed.xml", server.uri());

        let reply = commands.subscribe("s", "c", "Blog", &link).await;
        assert!(!reply.is_error, "{}", reply.text);

        let reply = commands.subscribe("s", "c", "Blog", &link).await;
        assert!(reply.is_error);
        assert!(reply.text.contains("already exists"));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_private_host_by_default() {
        let server = feed_server().await;
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::PublicOnly);

        let reply = commands
            .subscribe("s", "c", "Blog", &format!("{}/feed.xml", server.uri()))
            .await;
        assert!(reply.is_error);
        assert!(reply.text.starts_with("Invalid feed link"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_empty_collection_name() {
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);
        let reply = commands
            .subscribe("s", "c", "  ", "https://example.com/feed")
            .await;
        assert!(reply.is_error);
    }

    #[tokio::test]
    async fn test_subscribe_http_categories() {
        let server = feed_server().await;
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);

        let cases = [
            (401, "requires authentication"),
            (403, "forbidden"),
            (404, "not found"),
            (502, "Try again later"),
            (418, "returned HTTP 418"),
        ];
        for (status, expected) in cases {
            let link = format!("{}/status/{status}", server.uri());
            let reply = commands.subscribe("s", "c", "Blog", &link).await;
            assert!(reply.is_error);
            assert!(
                reply.text.contains(expected),
                "status {status}: {}",
                reply.text
            );
        }
        assert!(service.subscriptions("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_collection() {
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);
        let reply = commands.unsubscribe("s", "Nope").await;
        assert!(reply.is_error);
        assert_eq!(reply.text, "No collection named \"Nope\".");
    }

    #[tokio::test]
    async fn test_collection_names_trimmed_everywhere() {
        let server = feed_server().await;
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);
        let link = format!("{}/feed.xml", server.uri());
        let signal = ShutdownSignal::never();

        assert!(!commands.subscribe("s", "c", " Go ", &link).await.is_error);
        assert_eq!(
            commands.test("s", " Go ", &signal).await,
            Reply::ok("https://blog.example.com/one")
        );
        assert_eq!(
            commands.unsubscribe("s", " Go ").await,
            Reply::ok("Unsubscribed \"Go\".")
        );
    }

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            Request::parse("subscribe s1 general https://go.dev/blog/feed.atom The Go Blog"),
            Ok(Request::Subscribe {
                server_id: "s1".into(),
                channel_id: "general".into(),
                link: "https://go.dev/blog/feed.atom".into(),
                collection_name: "The Go Blog".into(),
            })
        );
        assert_eq!(
            Request::parse("  UNSUBSCRIBE s1   The Go Blog  "),
            Ok(Request::Unsubscribe {
                server_id: "s1".into(),
                collection_name: "The Go Blog".into(),
            })
        );
        assert_eq!(
            Request::parse("test s1 Go"),
            Ok(Request::Test {
                server_id: "s1".into(),
                collection_name: "Go".into(),
            })
        );
        assert_eq!(
            Request::parse("complete s1"),
            Ok(Request::Complete {
                server_id: "s1".into(),
                input: String::new(),
            })
        );
        assert_eq!(
            Request::parse("list s1"),
            Ok(Request::List {
                server_id: "s1".into()
            })
        );
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for line in [
            "",
            "list",
            "list s1 extra",
            "test s1",
            "unsubscribe s1 ",
            "subscribe s1 general",
            "subscribe s1 general https://go.dev/feed",
            "frobnicate s1",
        ] {
            assert!(Request::parse(line).is_err(), "{line:?}");
        }
    }

    #[tokio::test]
    async fn test_execute_dispatches() {
        let server = feed_server().await;
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);
        let signal = ShutdownSignal::never();

        let line = format!("subscribe s general {}/feed.xml Example Blog", server.uri());
        assert!(!commands.execute(&line, &signal).await.is_error);
        assert_eq!(
            commands.execute("list s", &signal).await,
            Reply::ok("Example Blog -> #general")
        );
        assert_eq!(
            commands.execute("test s Example Blog", &signal).await,
            Reply::ok("https://blog.example.com/one")
        );
        assert!(commands.execute("bogus", &signal).await.is_error);
    }

    #[tokio::test]
    async fn test_full_command_flow() {
        let server = feed_server().await;
        let service = service().await;
        let commands = Commands::new(&service, HostPolicy::AllowPrivate);
        let link = format!("{}/feed.xml", server.uri());
        let signal = ShutdownSignal::never();

        commands.subscribe("s", "general", "Example Blog", &link).await;

        assert_eq!(
            commands.test("s", "Example Blog", &signal).await,
            Reply::ok("https://blog.example.com/one")
        );
        assert_eq!(
            commands.complete("s", "exam").await,
            Reply::ok("Example Blog")
        );
        assert_eq!(
            commands.complete("s", "zzz").await,
            Reply::ok("No matching collections.")
        );
        assert_eq!(
            commands.list("s").await,
            Reply::ok("Example Blog -> #general")
        );
        assert!(!commands.unsubscribe("s", "Example Blog").await.is_error);
        assert_eq!(commands.list("s").await, Reply::ok("No subscriptions."));
    }
}
