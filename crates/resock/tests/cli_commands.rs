#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn resock() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_resock"));
    command.arg("--log-level").arg("error");
    command
}

fn unused_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
    listener.local_addr().expect("local addr").port()
}

fn wait_for_connect(port: u16, timeout: Duration) -> TcpStream {
    let start = Instant::now();
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return stream,
            Err(err) => {
                if start.elapsed() >= timeout {
                    panic!("connect timeout: {err}");
                }
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("child status") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = resock().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("resock {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_writes_one_line_per_message() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let mut child = resock()
        .arg("send")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--json")
        .arg(r#"{"a": 1}"#)
        .arg("--count")
        .arg("2")
        .arg("--interval")
        .arg("50ms")
        .stdout(Stdio::null())
        .spawn()
        .expect("send should start");

    let (stream, _) = listener.accept().expect("client should connect");
    let mut lines = BufReader::new(stream).lines();
    for _ in 0..2 {
        let line = lines.next().expect("line").expect("read");
        assert_eq!(line, r#"{"a":1}"#);
    }

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    assert!(status.success());
}

#[test]
fn send_queues_until_the_server_appears() {
    let port = unused_local_port();

    let mut child = resock()
        .arg("send")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--data")
        .arg("Hello everyone : 1")
        .arg("--reconnect-delay")
        .arg("50ms")
        .arg("--timeout")
        .arg("10s")
        .stdout(Stdio::null())
        .spawn()
        .expect("send should start");

    thread::sleep(Duration::from_millis(300));
    let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind reserved port");
    let (stream, _) = listener.accept().expect("client should connect");
    let line = BufReader::new(stream)
        .lines()
        .next()
        .expect("line")
        .expect("read");
    assert_eq!(line, "\"Hello everyone : 1\"");

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    assert!(status.success());
}

#[test]
fn send_without_server_times_out_with_124() {
    let port = unused_local_port();
    let output = resock()
        .arg("send")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--data")
        .arg("lost")
        .arg("--timeout")
        .arg("300ms")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn malformed_endpoint_is_a_usage_error() {
    let output = resock()
        .arg("send")
        .arg("localhost:")
        .arg("--data")
        .arg("x")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn serve_reports_bad_frames_and_echoes_good_ones() {
    let port = unused_local_port();
    let mut child = resock()
        .arg("--format")
        .arg("json")
        .arg("serve")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--echo")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .spawn()
        .expect("serve should start");

    let mut stream = wait_for_connect(port, Duration::from_secs(5));
    stream
        .write_all(b"definitely not json\n{\"hi\":1}\n")
        .expect("client write");

    let mut reader = BufReader::new(stream);
    let mut echoed = String::new();
    reader.read_line(&mut echoed).expect("echo should arrive");
    assert_eq!(echoed, "{\"hi\":1}\n");

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    assert!(status.success());

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        std::io::Read::read_to_string(&mut out, &mut stdout).expect("stdout");
    }
    let printed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("one json line on stdout");
    assert_eq!(printed["message"], serde_json::json!({"hi": 1}));
    assert_eq!(printed["kind"], "object");
}

#[test]
fn send_wait_prints_the_echoed_reply() {
    let port = unused_local_port();
    let mut server = resock()
        .arg("serve")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--echo")
        .stdout(Stdio::null())
        .spawn()
        .expect("serve should start");

    let output = resock()
        .arg("--format")
        .arg("raw")
        .arg("send")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--json")
        .arg(r#"{"ping":true}"#)
        .arg("--wait")
        .arg("--reconnect-delay")
        .arg("50ms")
        .arg("--timeout")
        .arg("10s")
        .output()
        .expect("send should run");

    let _ = server.kill();
    let _ = server.wait();

    assert!(output.status.success(), "send failed: {output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "{\"ping\":true}\n");
}
