//! Command-line front end for the meter driver: argument parsing and
//! output formatting (plain text, CSV, raw hex), none of which is part
//! of the core's contract (spec §1's "deliberately out of scope").

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use clap::Parser;
use onetouch_proto::{Meter, ProtoError, Record};

#[derive(Parser, Debug)]
#[command(name = "onetouch", version, about = "Lifescan OneTouch UltraEasy driver")]
struct Args {
    /// Path to the meter's serial device, or "facade" to use the
    /// built-in simulator instead of a real connection.
    #[arg(short = 'D', long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Print stored readings as CSV instead of plain text.
    #[arg(short = 'c', long)]
    csv: bool,

    /// Dump every stored reading.
    #[arg(short = 'd', long)]
    dump: bool,

    /// Dump every stored reading as raw hex words instead of decoding them.
    #[arg(short = 'R', long)]
    raw: bool,

    /// Print the meter's firmware version.
    #[arg(short = 'r', long = "meter-version")]
    meter_version: bool,

    /// Print the meter's serial number.
    #[arg(short = 's', long = "meter-serial")]
    meter_serial: bool,

    /// Print the meter's real-time clock alongside the local clock.
    #[arg(short = 't', long = "meter-time")]
    meter_time: bool,

    /// Raise logging verbosity; repeatable (error -> info -> debug -> trace).
    #[arg(short = 'V', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("ONETOUCH_LOG")
        .init();
}

fn show_meter_version(meter: &mut Meter) {
    match meter.read_version() {
        Ok(version) => println!("Meter version: {version}"),
        Err(e) => eprintln!("Cannot read meter version number: {e}"),
    }
}

fn show_meter_serial(meter: &mut Meter) {
    match meter.read_serial() {
        Ok(serial) => println!("Meter serial: {serial}"),
        Err(e) => eprintln!("Cannot read meter serial number: {e}"),
    }
}

fn show_meter_rtc(meter: &mut Meter) {
    let local = SystemTime::now();
    match meter.read_rtc() {
        Ok(rtc) => {
            let local_secs = local.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64;
            let rtc_secs = rtc.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64;
            println!(
                "Meter time: 0x{rtc_secs:08x} (local 0x{local_secs:08x}  delta {})",
                local_secs - rtc_secs
            );
        }
        Err(e) => eprintln!("Cannot read meter real time clock: {e}"),
    }
}

fn show_reading(record: &Record) {
    let datetime: DateTime<Utc> = record.timestamp.into();
    println!(
        "{}    {:4.1} mmol/l",
        datetime.format("%Y-%m-%d %H:%M:%S"),
        record.mmol_per_litre
    );
}

fn show_csv_reading(record: &Record) {
    let datetime: DateTime<Utc> = record.timestamp.into();
    println!(
        "\"{}\", \"{}\", \"{:3.1}\"",
        datetime.format("%d-%m-%Y"),
        datetime.format("%H:%M:%S"),
        record.mmol_per_litre
    );
}

fn show_raw_reading(record: &Record) {
    println!(
        "Raw date 0x{:08x}   Raw reading 0x{:08x}",
        record.raw_date, record.raw_reading
    );
}

fn dump_readings(meter: &mut Meter, args: &Args) -> Result<(), ProtoError> {
    let count = meter.read_record_count_raw()?;
    log::debug!("record count reply: {:?}", count.as_slice());

    let mut index = 0u16;
    loop {
        match meter.read_record(index) {
            Ok(record) => {
                if args.raw {
                    show_raw_reading(&record);
                } else if args.csv {
                    show_csv_reading(&record);
                } else {
                    show_reading(&record);
                }
                index += 1;
            }
            Err(e) => {
                if index == 0 {
                    eprintln!("Cannot read record {index}: {e}");
                    return Err(e);
                }
                break;
            }
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut meter = match Meter::open(&args.device) {
        Ok(meter) => meter,
        Err(e) => {
            eprintln!("Cannot connect to meter: {e}");
            return std::process::ExitCode::from(10);
        }
    };

    if args.meter_serial {
        show_meter_serial(&mut meter);
    }
    if args.meter_version {
        show_meter_version(&mut meter);
    }
    if args.meter_time {
        show_meter_rtc(&mut meter);
    }

    if args.dump || args.raw || args.csv {
        if dump_readings(&mut meter, &args).is_err() {
            return std::process::ExitCode::from(12);
        }
    }

    std::process::ExitCode::SUCCESS
}
