//! One producer thread appends messages while the main thread spins on an
//! image until the end of the stream.
//!
//! Run with:
//!   cargo run -p termlog --example spin-reader --features logging
//!
//! Pass a JSON config path as the first argument to change the log buffer
//! geometry or the logging setup.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use termlog::buffer::{compute_position, AppendOutcome, HeaderTemplate, LogBuffer, TermAppender};
use termlog::image::{Image, ImageConfig, SubscriberPosition};
use termlog::logging::init_logging;
use termlog::TermlogConfig;

const MESSAGE_LENGTH: usize = 256;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => TermlogConfig::from_path(Path::new(&path))?,
        None => TermlogConfig::default(),
    };
    init_logging(&config.logging);

    let log = Arc::new(config.build_log_buffer()?);

    // Stay within the ring: terms are never cleaned for reuse here.
    let terms = log.partition_count() as i64 - 1;
    let per_term = i64::from(log.term_length()) / (MESSAGE_LENGTH as i64 + 64);
    let message_count = (terms * per_term) as u64;

    let producer_log = Arc::clone(&log);
    let producer = thread::spawn(move || produce(&producer_log, message_count));

    let mut image = Image::with_config(
        Arc::clone(&log),
        SubscriberPosition::new(1, 0),
        ImageConfig {
            correlation_id: 1,
            session_id: 1,
            source_identity: "spin-reader".to_string(),
        },
    );

    let started = Instant::now();
    let mut messages = 0u64;
    let mut bytes = 0usize;
    while !image.is_end_of_stream() {
        let read = image.poll(
            |buffer, _| {
                messages += 1;
                bytes += buffer.len();
            },
            64,
        )?;
        if read == 0 {
            std::hint::spin_loop();
        }
    }

    producer
        .join()
        .map_err(|_| "producer thread panicked")??;
    let elapsed = started.elapsed();
    eprintln!(
        "Received {messages} messages ({bytes} bytes) in {elapsed:?}, final position {}",
        image.position()
    );

    image.close();
    Ok(())
}

fn produce(log: &LogBuffer, count: u64) -> termlog::buffer::Result<()> {
    let template = HeaderTemplate::new(1, 1);
    let payload = [0x5Au8; MESSAGE_LENGTH];
    let mut term_count = 0;
    let mut end_position = 0;

    for _ in 0..count {
        loop {
            let appender = TermAppender::new(log, log.active_partition_index())?;
            match appender.append_unfragmented(&template, &payload)? {
                AppendOutcome::Appended { resulting_offset } => {
                    end_position = compute_position(
                        (appender.raw_tail_volatile() >> 32) as i32,
                        resulting_offset,
                        log.position_bits_to_shift(),
                        log.initial_term_id(),
                    );
                    break;
                }
                AppendOutcome::Tripped { term_id } => {
                    log.rotate_log(term_count, term_id);
                    term_count += 1;
                }
            }
        }
    }

    log.set_end_of_stream_position(end_position);
    Ok(())
}
