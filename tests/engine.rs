//! End to end protocol scenarios against literal byte frames.
use pagio::{
    Encode, Engine, Outcome, PgValue, ProtocolStatus, ResultFormat, StartupConfig,
    TransactionStatus,
};

// ===== server frame builders =====

fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn auth_ok() -> Vec<u8> {
    frame(b'R', &0u32.to_be_bytes())
}

fn auth_md5(salt: [u8; 4]) -> Vec<u8> {
    let mut body = 5u32.to_be_bytes().to_vec();
    body.extend_from_slice(&salt);
    frame(b'R', &body)
}

fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    body.extend_from_slice(value.as_bytes());
    body.push(0);
    frame(b'S', &body)
}

fn backend_key_data(pid: u32, key: u32) -> Vec<u8> {
    let mut body = pid.to_be_bytes().to_vec();
    body.extend_from_slice(&key.to_be_bytes());
    frame(b'K', &body)
}

fn ready_for_query(status: u8) -> Vec<u8> {
    frame(b'Z', &[status])
}

/// (name, type oid, format code) per column.
fn row_description(fields: &[(&str, u32, u16)]) -> Vec<u8> {
    let mut body = (fields.len() as u16).to_be_bytes().to_vec();
    for (name, type_oid, format) in fields {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes()); // table oid
        body.extend_from_slice(&0i16.to_be_bytes()); // column
        body.extend_from_slice(&type_oid.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes()); // type size
        body.extend_from_slice(&(-1i32).to_be_bytes()); // type mod
        body.extend_from_slice(&format.to_be_bytes());
    }
    frame(b'T', &body)
}

fn data_row(values: &[Option<&[u8]>]) -> Vec<u8> {
    let mut body = (values.len() as u16).to_be_bytes().to_vec();
    for value in values {
        match value {
            None => body.extend_from_slice(&(-1i32).to_be_bytes()),
            Some(v) => {
                body.extend_from_slice(&(v.len() as i32).to_be_bytes());
                body.extend_from_slice(v);
            }
        }
    }
    frame(b'D', &body)
}

fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = tag.as_bytes().to_vec();
    body.push(0);
    frame(b'C', &body)
}

fn error_response(code: &str, message: &str, routine: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in [(b'V', "ERROR"), (b'C', code), (b'M', message)] {
        body.push(field);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    if let Some(routine) = routine {
        body.push(b'R');
        body.extend_from_slice(routine.as_bytes());
        body.push(0);
    }
    body.push(0);
    frame(b'E', &body)
}

fn parse_complete() -> Vec<u8> {
    frame(b'1', &[])
}

fn bind_complete() -> Vec<u8> {
    frame(b'2', &[])
}

fn close_complete() -> Vec<u8> {
    frame(b'3', &[])
}

fn notification(pid: u32, channel: &str, payload: &str) -> Vec<u8> {
    let mut body = pid.to_be_bytes().to_vec();
    body.extend_from_slice(channel.as_bytes());
    body.push(0);
    body.extend_from_slice(payload.as_bytes());
    body.push(0);
    frame(b'A', &body)
}

// ===== drivers =====

fn feed(engine: &mut Engine, mut bytes: &[u8]) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    while !bytes.is_empty() {
        let region = engine.write_region(bytes.len());
        let n = region.len().min(bytes.len());
        region[..n].copy_from_slice(&bytes[..n]);
        engine.advance(n);
        bytes = &bytes[n..];
        outcomes.extend(engine.drain().expect("drain"));
    }
    outcomes
}

fn connect(engine: &mut Engine) {
    let startup = engine
        .startup_message(&StartupConfig::new("fred").password(b"secret").database("app"))
        .unwrap();
    assert_eq!(&startup[4..8], &196608i32.to_be_bytes());

    let mut stream = auth_ok();
    stream.extend(parameter_status("client_encoding", "UTF8"));
    stream.extend(parameter_status("DateStyle", "ISO, MDY"));
    stream.extend(parameter_status("IntervalStyle", "postgres"));
    stream.extend(parameter_status("TimeZone", "UTC"));
    stream.extend(backend_key_data(4242, 1717));
    stream.extend(ready_for_query(b'I'));

    let outcomes = feed(engine, &stream);
    assert!(matches!(outcomes[..], [Outcome::Ready]));
    assert_eq!(engine.status(), ProtocolStatus::ReadyForQuery);
}

fn batch(outcomes: Vec<Outcome>) -> pagio::ResultSet {
    assert_eq!(outcomes.len(), 1, "expected one outcome, got {outcomes:?}");
    match outcomes.into_iter().next().unwrap() {
        Outcome::Batch(results) => results,
        other => panic!("expected a batch, got {other:?}"),
    }
}

fn chunk_tags(chunks: &[bytes::Bytes]) -> Vec<u8> {
    chunks.iter().map(|c| c[0]).collect()
}

// ===== scenarios =====

#[test]
fn simple_query_batch() {
    let mut engine = Engine::new();
    connect(&mut engine);

    let chunks = engine
        .execute_message("SELECT 1,'a'", vec![], ResultFormat::Default, false)
        .unwrap();
    assert_eq!(chunk_tags(&chunks), b"Q");
    assert_eq!(engine.status(), ProtocolStatus::Executing);

    let mut stream = row_description(&[("?column?", 23, 0), ("?column?", 25, 0)]);
    stream.extend(data_row(&[Some(b"1"), Some(b"a")]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(ready_for_query(b'I'));

    let results = batch(feed(&mut engine, &stream));
    assert_eq!(results.len(), 1);
    assert_eq!(results.tag(), Some("SELECT 1"));
    assert_eq!(
        results.rows().unwrap(),
        [[PgValue::Int4(1), PgValue::Text("a".into())]],
    );
    assert_eq!(engine.transaction_status(), TransactionStatus::Idle);
}

#[test]
fn extended_query_with_binary_parameter() {
    let mut engine = Engine::new();
    connect(&mut engine);

    let chunks = engine
        .execute_message(
            "SELECT $1::int4 + 1",
            vec![41.encode()],
            ResultFormat::Default,
            false,
        )
        .unwrap();
    // Parse, Bind, Describe, Execute+Sync
    assert_eq!(chunk_tags(&chunks), b"PBDE");
    let last = chunks.last().unwrap();
    assert_eq!(last[last.len() - 5], b'S');

    // the Parse message carries the int4 parameter oid
    let parse = &chunks[0];
    assert!(parse.windows(4).any(|w| w == 23u32.to_be_bytes()));

    let mut stream = parse_complete();
    stream.extend(bind_complete());
    stream.extend(row_description(&[("?column?", 23, 1)]));
    stream.extend(data_row(&[Some(&42i32.to_be_bytes())]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(ready_for_query(b'I'));

    let results = batch(feed(&mut engine, &stream));
    assert_eq!(results.rows().unwrap(), [[PgValue::Int4(42)]]);
}

/// One full cycle of the extended flow for a statement yielding int4 `7`.
fn run_int4_cycle(engine: &mut Engine, sql: &str, with_describe: bool) -> Vec<bytes::Bytes> {
    let chunks = engine
        .execute_message(sql, vec![7.encode()], ResultFormat::Default, false)
        .unwrap();

    let mut stream = Vec::new();
    if with_describe {
        stream.extend(parse_complete());
        stream.extend(bind_complete());
        stream.extend(row_description(&[("?column?", 23, 1)]));
    } else {
        stream.extend(bind_complete());
    }
    stream.extend(data_row(&[Some(&7i32.to_be_bytes())]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(ready_for_query(b'I'));

    let results = batch(feed(engine, &stream));
    assert_eq!(results.rows().unwrap(), [[PgValue::Int4(7)]]);
    chunks
}

#[test]
fn statement_prepares_at_threshold() {
    let mut engine = Engine::with_cache(1, 2);
    connect(&mut engine);

    // first execution parses the unnamed statement
    let chunks = run_int4_cycle(&mut engine, "SELECT $1::int4", true);
    assert_eq!(chunk_tags(&chunks), b"PBDE");
    assert_eq!(chunks[0][5], 0, "unnamed statement");

    // second execution reached the threshold: parse under the slot name
    let chunks = run_int4_cycle(&mut engine, "SELECT $1::int4", true);
    assert_eq!(chunk_tags(&chunks), b"PBDE");
    assert_eq!(&chunks[0][5..15], b"_pagio_001");

    // third execution binds the prepared statement, no Parse, no Describe
    let chunks = run_int4_cycle(&mut engine, "SELECT $1::int4", false);
    assert_eq!(chunk_tags(&chunks), b"BE");
    let bind = &chunks[0];
    // portal "" then the statement name
    assert_eq!(&bind[5..17], b"\0_pagio_001\0");
}

#[test]
fn eviction_closes_the_prepared_statement() {
    let mut engine = Engine::with_cache(1, 2);
    connect(&mut engine);

    // A once, B twice so B ends up prepared in slot 2
    run_int4_cycle(&mut engine, "SELECT $1::int4 + 0", true);
    run_int4_cycle(&mut engine, "SELECT $1::int4 + 1", true);
    let chunks = run_int4_cycle(&mut engine, "SELECT $1::int4 + 1", true);
    assert_eq!(&chunks[0][5..15], b"_pagio_002");

    // touch A so B is least recently used, then C evicts B
    run_int4_cycle(&mut engine, "SELECT $1::int4 + 0", true);
    run_int4_cycle(&mut engine, "SELECT $1::int4 + 2", true);

    // the next execute leads with Close of B's server side statement
    let chunks = engine
        .execute_message(
            "SELECT $1::int4 + 2",
            vec![7.encode()],
            ResultFormat::Default,
            false,
        )
        .unwrap();
    assert_eq!(chunk_tags(&chunks), b"CPBDE");
    assert_eq!(&chunks[0][5..17], b"S_pagio_002\0");

    let mut stream = close_complete();
    stream.extend(parse_complete());
    stream.extend(bind_complete());
    stream.extend(row_description(&[("?column?", 23, 1)]));
    stream.extend(data_row(&[Some(&7i32.to_be_bytes())]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(ready_for_query(b'I'));
    let results = batch(feed(&mut engine, &stream));
    assert_eq!(results.rows().unwrap(), [[PgValue::Int4(7)]]);

    // the close is no longer pending
    let chunks = engine
        .execute_message("SELECT 1", vec![], ResultFormat::Default, false)
        .unwrap();
    assert_eq!(chunk_tags(&chunks), b"Q");
}

#[test]
fn zero_threshold_disables_caching() {
    let mut engine = Engine::with_cache(0, 2);
    connect(&mut engine);

    for _ in 0..3 {
        let chunks = run_int4_cycle(&mut engine, "SELECT $1::int4", true);
        assert_eq!(chunk_tags(&chunks), b"PBDE");
        assert_eq!(chunks[0][5], 0, "always the unnamed statement");
    }
}

#[test]
fn discard_all_wipes_the_cache() {
    let mut engine = Engine::with_cache(1, 2);
    connect(&mut engine);

    // prepare the statement
    run_int4_cycle(&mut engine, "SELECT $1::int4", true);
    run_int4_cycle(&mut engine, "SELECT $1::int4", true);
    let chunks = run_int4_cycle(&mut engine, "SELECT $1::int4", false);
    assert_eq!(chunk_tags(&chunks), b"BE");

    let chunks = engine
        .execute_message("DISCARD ALL", vec![], ResultFormat::Default, false)
        .unwrap();
    assert_eq!(chunk_tags(&chunks), b"Q");
    let mut stream = command_complete("DISCARD ALL");
    stream.extend(ready_for_query(b'I'));
    let results = batch(feed(&mut engine, &stream));
    assert_eq!(results.tag(), Some("DISCARD ALL"));

    // the statement starts over with an unnamed parse
    let chunks = engine
        .execute_message("SELECT $1::int4", vec![7.encode()], ResultFormat::Default, false)
        .unwrap();
    assert_eq!(chunk_tags(&chunks), b"PBDE");
    assert_eq!(chunks[0][5], 0);
}

#[test]
fn server_error_is_reported_at_ready_for_query() {
    let mut engine = Engine::new();
    connect(&mut engine);

    engine
        .execute_message("SELECT nope", vec![], ResultFormat::Default, false)
        .unwrap();

    let mut stream = error_response("42703", "column \"nope\" does not exist", None);
    stream.extend(ready_for_query(b'I'));

    let outcomes = feed(&mut engine, &stream);
    assert_eq!(outcomes.len(), 1);
    let Outcome::Failed(err) = &outcomes[0] else {
        panic!("expected a failed outcome");
    };
    let server = err.as_server_error().expect("server error");
    assert_eq!(server.code, "42703");

    // the connection stays usable
    assert_eq!(engine.status(), ProtocolStatus::ReadyForQuery);
    engine
        .execute_message("SELECT 1", vec![], ResultFormat::Default, false)
        .unwrap();
}

#[test]
fn error_on_prepared_statement_schedules_its_close() {
    let mut engine = Engine::with_cache(1, 2);
    connect(&mut engine);

    run_int4_cycle(&mut engine, "SELECT $1::int4", true);
    run_int4_cycle(&mut engine, "SELECT $1::int4", true);

    // prepared execution fails after a schema change
    engine
        .execute_message("SELECT $1::int4", vec![7.encode()], ResultFormat::Default, false)
        .unwrap();
    let mut stream = bind_complete();
    stream.extend(error_response(
        "0A000",
        "cached plan must not change result type",
        Some("RevalidateCachedQuery"),
    ));
    stream.extend(ready_for_query(b'I'));
    let outcomes = feed(&mut engine, &stream);
    let Outcome::Failed(err) = &outcomes[0] else {
        panic!("expected a failed outcome");
    };
    let server = err.as_server_error().unwrap();
    assert!(server.is_cached_plan_invalid());
    assert_eq!(engine.transaction_status(), TransactionStatus::Idle);

    // the retry leads with the Close and parses from scratch
    let chunks = engine
        .execute_message("SELECT $1::int4", vec![7.encode()], ResultFormat::Default, false)
        .unwrap();
    assert_eq!(chunk_tags(&chunks), b"CPBDE");
    assert_eq!(&chunks[0][5..17], b"S_pagio_001\0");
}

#[test]
fn no_second_execute_while_executing() {
    let mut engine = Engine::new();
    connect(&mut engine);

    engine
        .execute_message("SELECT 1", vec![], ResultFormat::Default, false)
        .unwrap();
    assert!(engine
        .execute_message("SELECT 2", vec![], ResultFormat::Default, false)
        .is_err());
}

#[test]
fn raw_results_bypass_the_registry() {
    let mut engine = Engine::new();
    connect(&mut engine);

    engine
        .execute_message("SELECT 1", vec![], ResultFormat::Default, true)
        .unwrap();
    let mut stream = row_description(&[("?column?", 23, 0)]);
    stream.extend(data_row(&[Some(b"1")]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(ready_for_query(b'I'));

    let results = batch(feed(&mut engine, &stream));
    assert_eq!(results.rows().unwrap(), [[PgValue::Text("1".into())]]);
}

#[test]
fn multi_statement_script_preserves_server_order() {
    let mut engine = Engine::new();
    connect(&mut engine);

    engine
        .execute_message("SELECT 1; CREATE TABLE t (a int)", vec![], ResultFormat::Default, false)
        .unwrap();
    let mut stream = row_description(&[("?column?", 23, 0)]);
    stream.extend(data_row(&[Some(b"1")]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(command_complete("CREATE TABLE"));
    stream.extend(ready_for_query(b'I'));

    let mut results = batch(feed(&mut engine, &stream));
    assert_eq!(results.len(), 2);
    assert_eq!(results.tag(), Some("SELECT 1"));
    assert!(results.next_result());
    assert_eq!(results.tag(), Some("CREATE TABLE"));
    assert!(results.rows().is_none());
}

#[test]
fn md5_authentication_round() {
    let mut engine = Engine::new();
    engine
        .startup_message(&StartupConfig::new("fred").password(b"secret"))
        .unwrap();

    let outcomes = feed(&mut engine, &auth_md5(*b"salt"));
    assert_eq!(outcomes.len(), 1);
    let Outcome::Send(response) = &outcomes[0] else {
        panic!("expected an auth response");
    };
    assert_eq!(response[0], b'p');
    assert_eq!(&response[5..8], b"md5");

    let mut stream = auth_ok();
    stream.extend(parameter_status("client_encoding", "UTF8"));
    stream.extend(ready_for_query(b'I'));
    let outcomes = feed(&mut engine, &stream);
    assert!(matches!(outcomes[..], [Outcome::Ready]));
}

#[test]
fn wrong_client_encoding_is_fatal() {
    let mut engine = Engine::new();
    engine
        .startup_message(&StartupConfig::new("fred").password(b"secret"))
        .unwrap();

    let mut stream = auth_ok();
    stream.extend(parameter_status("client_encoding", "LATIN1"));

    let region = engine.write_region(stream.len());
    region[..stream.len()].copy_from_slice(&stream);
    engine.advance(stream.len());
    assert!(engine.drain().is_err());
    assert_eq!(engine.status(), ProtocolStatus::Closed);
}

#[test]
fn notifications_are_queued() {
    let mut engine = Engine::new();
    connect(&mut engine);

    let outcomes = feed(&mut engine, &notification(99, "jobs", "job 1 done"));
    assert!(outcomes.is_empty());
    let n = engine.take_notification().unwrap();
    assert_eq!((n.process_id, n.channel.as_str(), n.payload.as_str()), (99, "jobs", "job 1 done"));
}

#[test]
fn cancel_message_uses_the_backend_key() {
    let mut engine = Engine::new();
    connect(&mut engine);

    let cancel = engine.cancel_message().unwrap();
    assert_eq!(&cancel[..4], &16i32.to_be_bytes());
    assert_eq!(&cancel[4..8], &80877102i32.to_be_bytes());
    assert_eq!(&cancel[8..12], &4242u32.to_be_bytes());
    assert_eq!(&cancel[12..16], &1717u32.to_be_bytes());
}

#[test]
fn ssl_request_negotiation() {
    let mut engine = Engine::new();
    let request = engine.ssl_request_message().unwrap();
    assert_eq!(&request[..4], &8i32.to_be_bytes());
    assert_eq!(&request[4..8], &80877103i32.to_be_bytes());

    // the server answers with a single unframed byte
    let outcomes = feed(&mut engine, b"S");
    assert!(matches!(outcomes[..], [Outcome::SslAccepted(true)]));

    // startup proceeds on the (now encrypted) stream
    engine
        .startup_message(&StartupConfig::new("fred").password(b"secret"))
        .unwrap();
    assert_eq!(engine.status(), ProtocolStatus::Connecting);

    let mut engine = Engine::new();
    engine.ssl_request_message().unwrap();
    let outcomes = feed(&mut engine, b"N");
    assert!(matches!(outcomes[..], [Outcome::SslAccepted(false)]));
}

#[test]
fn empty_query_yields_an_empty_batch() {
    let mut engine = Engine::new();
    connect(&mut engine);

    engine
        .execute_message("", vec![], ResultFormat::Default, false)
        .unwrap();
    let mut stream = frame(b'I', &[]);
    stream.extend(ready_for_query(b'I'));

    let results = batch(feed(&mut engine, &stream));
    assert!(results.is_empty());
}

#[test]
fn decode_failure_is_reported_like_a_server_error() {
    let mut engine = Engine::new();
    connect(&mut engine);

    engine
        .execute_message("SELECT 1", vec![], ResultFormat::Default, false)
        .unwrap();
    // an int4 column carrying garbage text
    let mut stream = row_description(&[("?column?", 23, 0)]);
    stream.extend(data_row(&[Some(b"not-a-number")]));
    stream.extend(command_complete("SELECT 1"));
    stream.extend(ready_for_query(b'I'));

    let outcomes = feed(&mut engine, &stream);
    assert!(matches!(outcomes[..], [Outcome::Failed(_)]));
    assert_eq!(engine.status(), ProtocolStatus::ReadyForQuery);
}
