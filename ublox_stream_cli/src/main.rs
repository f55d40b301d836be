use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use log::info;
use std::{
    sync::mpsc,
    time::{Duration, Instant},
};
use ublox_stream::{
    Device, DeviceConfig, MessageBuffer, MessageId, Protocol, Transport, TransportType,
    UartTransport,
};

fn cli() -> Command {
    Command::new("u-blox stream CLI")
        .author(clap::crate_authors!())
        .about("Talks to a u-blox GNSS receiver on a serial port")
        .arg_required_else_help(true)
        .arg(
            Arg::new("port")
                .value_name("port")
                .short('p')
                .long("port")
                .required(true)
                .help("Serial port to open"),
        )
        .arg(
            Arg::new("baud")
                .value_name("baud")
                .short('s')
                .long("baud")
                .required(false)
                .default_value("9600")
                .value_parser(value_parser!(u32))
                .help("Baud rate of the port to open"),
        )
        .arg(
            Arg::new("ubx-only")
                .long("ubx-only")
                .action(clap::ArgAction::SetTrue)
                .help("The port carries UBX only"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .help("Log every UBX command and response"),
        )
        .subcommand(Command::new("version").about("Poll UBX-MON-VER and print the versions"))
        .subcommand(
            Command::new("poll")
                .about("Send a UBX message and print the body of the reply as hex")
                .arg(Arg::new("class").required(true).help("Class, hex"))
                .arg(Arg::new("id").required(true).help("Id, hex"))
                .arg(Arg::new("body").default_value("").help("Body, hex")),
        )
        .subcommand(
            Command::new("receive")
                .about("Wait for one message and print it as hex")
                .arg(
                    Arg::new("message")
                        .required(true)
                        .help("any, all, ubx:<class>:<id> (hex, ff for any), nmea:<id> or rtcm:<type>"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("5")
                        .value_parser(value_parser!(u64))
                        .help("Seconds to wait"),
                ),
        )
        .subcommand(
            Command::new("listen")
                .about("Print the id of every message received")
                .arg(
                    Arg::new("message")
                        .default_value("all")
                        .help("Messages to print, as for receive"),
                )
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .default_value("10")
                        .value_parser(value_parser!(u64))
                        .help("Seconds to listen for"),
                ),
        )
        .subcommand(
            Command::new("protocol")
                .about("Switch an output protocol on or off for this port")
                .arg(
                    Arg::new("protocol")
                        .required(true)
                        .value_parser(["nmea", "rtcm", "all"]),
                )
                .arg(Arg::new("state").required(true).value_parser(["on", "off"])),
        )
}

fn parse_message_id(s: &str) -> Result<MessageId> {
    let fields: Vec<&str> = s.split(':').collect();
    Ok(match fields.as_slice() {
        ["any"] => MessageId::Any,
        ["all"] => MessageId::All,
        ["ubx"] => MessageId::ubx_any(),
        ["ubx", class, id] => MessageId::ubx(
            u8::from_str_radix(class, 16).context("UBX class")?,
            u8::from_str_radix(id, 16).context("UBX id")?,
        ),
        ["nmea"] => MessageId::nmea("")?,
        ["nmea", id] => MessageId::nmea(id)?,
        ["rtcm", message_type] => MessageId::rtcm(message_type.parse().context("RTCM type")?),
        _ => bail!("cannot make sense of message id {:?}", s),
    })
}

fn open_device(matches: &ArgMatches) -> Result<Device> {
    let port = matches
        .get_one::<String>("port")
        .context("no port given")?;
    let baud = matches.get_one::<u32>("baud").copied().unwrap_or(9600);
    let serial = serialport::new(port, baud)
        .timeout(Duration::from_millis(10))
        .open()
        .with_context(|| format!("failed to open {}", port))?;

    let transport_type = if matches.get_flag("ubx-only") {
        TransportType::UbxUart
    } else {
        TransportType::Uart
    };
    let config = DeviceConfig {
        print_messages: matches.get_flag("verbose"),
        ..DeviceConfig::new(transport_type)
    };
    Ok(Device::new(config, Transport::stream(UartTransport::new(serial)))?)
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        bail!("odd number of hex digits in {:?}", s);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).with_context(|| format!("bad hex {:?}", s)))
        .collect()
}

fn hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn poll(device: &Device, sub: &ArgMatches) -> Result<()> {
    let byte = |name: &str| -> Result<u8> {
        let s = sub.get_one::<String>(name).context("missing argument")?;
        u8::from_str_radix(s, 16).with_context(|| format!("bad {} {:?}", name, s))
    };
    let (class, id) = (byte("class")?, byte("id")?);
    let body = parse_hex(sub.get_one::<String>("body").map_or("", String::as_str))?;
    let reply = device.send_receive_ubx_alloc(class, id, &body)?;
    println!("0x{:02x} 0x{:02x} [{} bytes]: {}", class, id, reply.len(), hex_string(&reply));
    Ok(())
}

fn print_version(device: &Device) -> Result<()> {
    let body = device.send_receive_ubx_alloc(0x0a, 0x04, &[])?;
    let text = |b: &[u8]| {
        String::from_utf8_lossy(b)
            .trim_end_matches('\0')
            .to_string()
    };
    if body.len() < 40 {
        bail!("short MON-VER response ({} bytes)", body.len());
    }
    println!("software: {}", text(&body[..30]));
    println!("hardware: {}", text(&body[30..40]));
    for extension in body[40..].chunks(30) {
        println!("extension: {}", text(extension));
    }
    Ok(())
}

fn receive(device: &Device, wanted: &MessageId, timeout: Duration) -> Result<()> {
    let msg = device.msg_receive(wanted, MessageBuffer::Owned, timeout, None)?;
    println!("{} [{} bytes]: {}", msg.id, msg.frame.len(), hex_string(&msg.frame));
    Ok(())
}

fn listen(device: &Device, wanted: MessageId, duration: Duration) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let reader = device.msg_receive_start(wanted, move |id, len, _| {
        let _ = tx.send((*id, len));
    })?;
    let start = Instant::now();
    while let Some(left) = duration.checked_sub(start.elapsed()) {
        match rx.recv_timeout(left) {
            Ok((id, len)) => println!("{} ({} bytes)", id, len),
            Err(mpsc::RecvTimeoutError::Timeout) => break,
            Err(e) => return Err(e.into()),
        }
    }
    device.msg_receive_stop(reader)?;
    info!(
        "lost {} byte(s) behind, {} byte(s) not buffered",
        device.msg_receive_stat_read_loss(),
        device.msg_receive_stat_stream_loss()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let matches = cli().get_matches();
    let device = open_device(&matches)?;

    match matches.subcommand() {
        Some(("version", _)) => print_version(&device)?,
        Some(("poll", sub)) => poll(&device, sub)?,
        Some(("receive", sub)) => {
            let wanted = parse_message_id(sub.get_one::<String>("message").context("message")?)?;
            let timeout = Duration::from_secs(sub.get_one::<u64>("timeout").copied().unwrap_or(5));
            receive(&device, &wanted, timeout)?;
        },
        Some(("listen", sub)) => {
            let wanted = parse_message_id(sub.get_one::<String>("message").context("message")?)?;
            let duration = Duration::from_secs(sub.get_one::<u64>("duration").copied().unwrap_or(10));
            listen(&device, wanted, duration)?;
        },
        Some(("protocol", sub)) => {
            let protocol = match sub.get_one::<String>("protocol").map(String::as_str) {
                Some("nmea") => Protocol::Nmea,
                Some("rtcm") => Protocol::Rtcm,
                _ => Protocol::All,
            };
            let on = sub.get_one::<String>("state").map(String::as_str) == Some("on");
            device.set_protocol_out(protocol, on)?;
            println!("output protocols: {:?}", device.get_protocol_out()?);
        },
        _ => print_version(&device)?,
    }
    Ok(())
}
