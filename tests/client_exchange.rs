use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use postbox::client::probe;
use postbox::server::{Handler, PingHandler, SequencedHandler, Server, ServerSession, ServerStats};
use postbox::{
    Client, ClientConfig, Error, Mailbox, Record, RecordLayout, ServerConfig, Shutdown, Status,
    Variant,
};
use tempfile::tempdir;

struct RunningServer {
    shutdown: Shutdown,
    handle: JoinHandle<ServerStats>,
}

impl RunningServer {
    fn spawn<H: Handler + Send + 'static>(
        path: &Path,
        variant: Variant,
        handler: H,
        instance: u32,
    ) -> Self {
        let config = ServerConfig {
            poll_interval_ms: 5,
            error_backoff_ms: 20,
            courtesy_delay_ms: 0,
            ..ServerConfig::for_variant(variant)
        };
        Self::spawn_with(path, config, handler, instance)
    }

    fn spawn_with<H: Handler + Send + 'static>(
        path: &Path,
        config: ServerConfig,
        handler: H,
        instance: u32,
    ) -> Self {
        let mailbox = Mailbox::create(path, config.variant.layout()).expect("create");
        let shutdown = Shutdown::new();
        let token = shutdown.clone();
        let handle = std::thread::spawn(move || {
            let mut server = Server::new(mailbox, handler, ServerSession::new(instance), config);
            server.run(&token).expect("server run")
        });
        Self { shutdown, handle }
    }

    fn stop(self) -> ServerStats {
        self.shutdown.trigger();
        self.handle.join().expect("server thread")
    }
}

fn fast_client(variant: Variant) -> ClientConfig {
    ClientConfig {
        poll_interval_ms: 5,
        free_wait_attempts: 200,
        response_timeout_ms: 2_000,
        probe_interval_ms: 5,
        probe_timeout_ms: 500,
        ..ClientConfig::for_variant(variant)
    }
}

fn bound_client(path: &Path, config: ClientConfig) -> Client {
    let mut client = Client::new(config.clone());
    client.bind(Mailbox::open(path, config.variant.layout()).expect("open"));
    client
}

fn mailbox_path(dir: &Path) -> PathBuf {
    dir.join("ipc_server_1.bin")
}

#[test]
fn first_ping_assigns_and_adopts_client_id() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let server = RunningServer::spawn(&path, Variant::Ping, PingHandler, 1);
    let mut client = bound_client(&path, fast_client(Variant::Ping));
    let shutdown = Shutdown::new();

    let exchange = client.request("ping", &shutdown).expect("request");
    assert_eq!(exchange.assigned_id, Some(1));
    assert_eq!(
        exchange.payload.as_deref(),
        Some("pong from server #1 to client #1")
    );
    assert_eq!(client.client_id(), 1);

    let second = client.request("ping", &shutdown).expect("second request");
    assert_eq!(second.assigned_id, None);
    assert_eq!(client.client_id(), 1);

    let stats = server.stop();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.unique_clients, 1);
}

#[test]
fn completed_exchange_leaves_slot_free_with_known_id() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let server = RunningServer::spawn(&path, Variant::Ping, PingHandler, 1);
    let mut client = bound_client(&path, fast_client(Variant::Ping));

    client.request("ping", &Shutdown::new()).expect("request");
    // Read before stopping the server, which overwrites with its notice.
    let record = Mailbox::open(&path, RecordLayout::MultiClient)
        .expect("open")
        .read()
        .expect("read");
    server.stop();

    assert_eq!(record, Record::free(1));
}

#[test]
fn rejected_request_is_surfaced_and_slot_freed() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let server = RunningServer::spawn(&path, Variant::Ping, PingHandler, 1);
    let mut client = bound_client(&path, fast_client(Variant::Ping));

    let exchange = client.request("PONG", &Shutdown::new()).expect("request");
    assert_eq!(
        exchange.payload.as_deref(),
        Some("ERROR: Only 'ping' is accepted")
    );
    assert_eq!(exchange.assigned_id, None);
    assert_eq!(client.client_id(), 0);

    let stats = server.stop();
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.rejected, 1);
}

#[test]
fn observed_statuses_follow_the_exchange_cycle() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let server = RunningServer::spawn(&path, Variant::Ping, PingHandler, 1);

    let client_path = path.clone();
    let client = std::thread::spawn(move || {
        let mut client = bound_client(&client_path, fast_client(Variant::Ping));
        client.request("ping", &Shutdown::new()).expect("request")
    });

    let observer = Mailbox::open(&path, RecordLayout::MultiClient).expect("open");
    let mut seen = vec![Status::Free];
    while !client.is_finished() {
        if let Ok(record) = observer.read() {
            if seen.last() != Some(&record.status) {
                seen.push(record.status);
            }
        }
    }
    client.join().expect("client thread");
    server.stop();

    let cycle = [Status::Free, Status::Request, Status::Response, Status::Free];
    let mut position = 0;
    for status in &seen {
        let offset = cycle[position..]
            .iter()
            .position(|s| s == status)
            .unwrap_or_else(|| panic!("status order violated: {seen:?}"));
        position += offset;
    }
}

#[test]
fn sequenced_exchange_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mailbox.bin");
    let server = RunningServer::spawn(&path, Variant::Sequenced, SequencedHandler::new(), 1);
    let mut client = bound_client(&path, fast_client(Variant::Sequenced));

    let exchange = client.request("[1] hello", &Shutdown::new()).expect("request");
    assert_eq!(exchange.payload.as_deref(), Some("[1] ack: hello"));
    assert_eq!(exchange.assigned_id, None);
    server.stop();
}

#[test]
fn empty_reply_yields_no_payload() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mailbox.bin");
    let handler = SequencedHandler::with_simulated_faults(Duration::from_millis(1));
    let server = RunningServer::spawn(&path, Variant::Sequenced, handler, 1);
    let mut client = bound_client(&path, fast_client(Variant::Sequenced));

    let exchange = client.request("[1] empty", &Shutdown::new()).expect("request");
    assert_eq!(exchange.payload, None);
    server.stop();
}

#[test]
fn busy_slot_is_reported_without_sending() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let mailbox = Mailbox::create(&path, RecordLayout::MultiClient).expect("create");
    let stuck = Record::request(9, "someone else's request");
    mailbox.write(&stuck).expect("write");

    let config = ClientConfig {
        free_wait_attempts: 3,
        ..fast_client(Variant::Ping)
    };
    let mut client = bound_client(&path, config);
    let err = client.request("ping", &Shutdown::new()).unwrap_err();

    assert!(matches!(err, Error::Busy));
    assert_eq!(mailbox.read().expect("read"), stuck);
}

#[test]
fn timeout_resets_slot_to_free() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let mailbox = Mailbox::create(&path, RecordLayout::MultiClient).expect("create");

    let config = ClientConfig {
        response_timeout_ms: 50,
        ..fast_client(Variant::Ping)
    };
    let mut client = bound_client(&path, config);
    let start = Instant::now();
    let err = client.request("ping", &Shutdown::new()).unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(50));
    let record = mailbox.read().expect("read");
    assert_eq!(record.status, Status::Free);
    assert!(record.payload_bytes().is_empty());
}

#[test]
fn withheld_reply_times_out_then_next_request_succeeds() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mailbox.bin");
    let handler = SequencedHandler::with_simulated_faults(Duration::from_millis(1));
    let server = RunningServer::spawn(&path, Variant::Sequenced, handler, 1);
    let config = ClientConfig {
        response_timeout_ms: 100,
        ..fast_client(Variant::Sequenced)
    };
    let mut client = bound_client(&path, config);
    let shutdown = Shutdown::new();

    let err = client.request("[1] silent", &shutdown).unwrap_err();
    assert!(matches!(err, Error::Timeout));

    let exchange = client.request("[2] again", &shutdown).expect("request");
    assert_eq!(exchange.payload.as_deref(), Some("[2] ack: again"));
    let stats = server.stop();
    assert_eq!(stats.withheld, 1);
}

#[test]
fn shutdown_notice_is_detected_before_sending() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let mailbox = Mailbox::create(&path, RecordLayout::MultiClient).expect("create");
    mailbox.write(&Record::shutdown_notice()).expect("write");

    let mut client = bound_client(&path, fast_client(Variant::Ping));
    let err = client.request("ping", &Shutdown::new()).unwrap_err();

    assert!(matches!(err, Error::ServerShutdown));
    assert!(mailbox.read().expect("read").is_shutdown_notice());
}

#[test]
fn cancelled_client_does_not_send() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let mailbox = Mailbox::create(&path, RecordLayout::MultiClient).expect("create");
    let mut client = bound_client(&path, fast_client(Variant::Ping));

    let shutdown = Shutdown::new();
    shutdown.trigger();
    let err = client.request("ping", &shutdown).unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(mailbox.read().expect("read"), Record::free(0));
}

#[test]
fn unbound_client_is_not_connected() {
    let mut client = Client::new(ClientConfig::default());
    let err = client.request("ping", &Shutdown::new()).unwrap_err();
    assert!(matches!(err, Error::NotConnected));
    client.release().expect("release is a no-op");
}

#[test]
fn probe_detects_live_and_silent_servers() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let config = fast_client(Variant::Ping);
    let shutdown = Shutdown::new();

    let server = RunningServer::spawn(&path, Variant::Ping, PingHandler, 1);
    let mailbox = Mailbox::open(&path, RecordLayout::MultiClient).expect("open");
    assert!(probe(&mailbox, 0, &config, &shutdown).expect("probe"));
    assert_eq!(mailbox.read().expect("read"), Record::free(0));
    server.stop();

    // No owner left: the slot holds the shutdown notice and is not probed.
    assert!(!probe(&mailbox, 0, &config, &shutdown).expect("probe"));

    mailbox.write(&Record::free(0)).expect("write");
    let quick = ClientConfig {
        probe_timeout_ms: 30,
        ..config
    };
    assert!(!probe(&mailbox, 0, &quick, &shutdown).expect("probe"));
    assert_eq!(mailbox.read().expect("read"), Record::free(0));
}

#[test]
fn unanswered_liveness_check_leaves_slot_free_for_slow_server() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let server_config = ServerConfig {
        poll_interval_ms: 700,
        courtesy_delay_ms: 0,
        ..ServerConfig::for_variant(Variant::Ping)
    };
    let server = RunningServer::spawn_with(&path, server_config, PingHandler, 1);
    // Let the server take its first look and go to sleep.
    std::thread::sleep(Duration::from_millis(100));

    let config = ClientConfig {
        probe_timeout_ms: 300,
        ..fast_client(Variant::Ping)
    };
    let mailbox = Mailbox::open(&path, RecordLayout::MultiClient).expect("open");
    assert!(!probe(&mailbox, 0, &config, &Shutdown::new()).expect("probe"));
    assert_eq!(mailbox.read().expect("read"), Record::free(0));

    std::thread::sleep(Duration::from_millis(1_000));
    assert_eq!(mailbox.read().expect("read"), Record::free(0));

    let mut client = bound_client(&path, config);
    let exchange = client.request("ping", &Shutdown::new()).expect("request");
    assert_eq!(exchange.assigned_id, Some(1));

    let stats = server.stop();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.unique_clients, 1);
}

#[test]
fn sequenced_liveness_check_is_accepted() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mailbox.bin");
    let server = RunningServer::spawn(&path, Variant::Sequenced, SequencedHandler::new(), 1);
    let mut client = bound_client(&path, fast_client(Variant::Sequenced));
    let shutdown = Shutdown::new();

    let status = client.status(&shutdown).expect("status");
    assert_eq!(status.alive, Some(true));
    client.request("[1] hello", &shutdown).expect("request");

    let stats = server.stop();
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.processed, 2);
}

#[test]
fn verified_client_reports_lost_claim() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let mailbox = Mailbox::create(&path, RecordLayout::MultiClient).expect("create");
    let rival = Record::request(9, "ping");

    // Another writer that grabs the slot as soon as our request lands.
    let rival_path = path.clone();
    let rival_record = rival.clone();
    let stop = Shutdown::new();
    let rival_stop = stop.clone();
    let rival_writer = std::thread::spawn(move || {
        let mailbox = Mailbox::open(&rival_path, RecordLayout::MultiClient).expect("open");
        while !rival_stop.is_triggered() {
            if let Ok(record) = mailbox.read() {
                if record.status == Status::Request && record.client_id == 0 {
                    mailbox.write(&rival_record).expect("clobber");
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    });

    let config = ClientConfig {
        verify_claim: true,
        ..fast_client(Variant::Ping)
    };
    let mut client = bound_client(&path, config);
    let err = client.request("ping", &Shutdown::new()).unwrap_err();
    stop.trigger();
    rival_writer.join().expect("rival thread");

    assert!(matches!(err, Error::ClaimLost));
    assert_eq!(mailbox.read().expect("read"), rival);
    assert_eq!(client.client_id(), 0);
}

#[test]
fn verified_client_sees_taken_slot_as_busy() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let mailbox = Mailbox::create(&path, RecordLayout::MultiClient).expect("create");
    let rival = Record::request(9, "ping");
    mailbox.write(&rival).expect("write");

    let config = ClientConfig {
        verify_claim: true,
        free_wait_attempts: 3,
        ..fast_client(Variant::Ping)
    };
    let mut client = bound_client(&path, config);
    let err = client.request("ping", &Shutdown::new()).unwrap_err();

    assert!(matches!(err, Error::Busy));
    assert_eq!(mailbox.read().expect("read"), rival);
}

#[test]
fn status_reports_binding_and_liveness() {
    let dir = tempdir().expect("tempdir");
    let path = mailbox_path(dir.path());
    let server = RunningServer::spawn(&path, Variant::Ping, PingHandler, 1);
    let mut client = bound_client(&path, fast_client(Variant::Ping));
    let shutdown = Shutdown::new();

    client.request("ping", &shutdown).expect("request");
    let status = client.status(&shutdown).expect("status");
    assert_eq!(status.mailbox.as_deref(), Some(path.as_path()));
    assert_eq!(status.client_id, 1);
    assert_eq!(status.alive, Some(true));
    server.stop();

    assert_eq!(client.disconnect(), Some(path));
    assert_eq!(client.client_id(), 0);
    let status = client.status(&shutdown).expect("status");
    assert_eq!(status.mailbox, None);
    assert_eq!(status.alive, None);
}
