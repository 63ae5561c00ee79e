use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use sensorbridge_bridge::{AddressTable, ChannelKind, Message, OutboundCommand, StatsSnapshot};
#[cfg(unix)]
use sensorbridge_transport::PortInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    address: u8,
    name: &'a str,
    value: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    opto_slot: Option<u8>,
    timestamp: String,
}

/// Print one decoded reading. `frame` is the resolved frame it came from,
/// used by the raw format.
pub fn print_message(msg: &Message<'_>, frame: &[u8], format: OutputFormat) {
    let opto_slot = match msg.kind {
        ChannelKind::Opto { index } => Some(index),
        ChannelKind::Value => None,
    };
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                address: msg.address,
                name: msg.name,
                value: msg.value,
                opto_slot,
                timestamp: now_unix_millis(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["ADDR", "NAME", "VALUE"]);
            table.add_row(vec![
                msg.address.to_string(),
                msg.name.to_string(),
                msg.value.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match opto_slot {
            Some(slot) => println!(
                "{:>3} {} [slot {}] {}",
                msg.address, msg.name, slot, msg.value
            ),
            None => println!("{:>3} {} {}", msg.address, msg.name, msg.value),
        },
        OutputFormat::Raw => println!("{}", hex(frame)),
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct ChannelOutput<'a> {
    address: u8,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    opto_slot: Option<u8>,
}

fn channel_rows(table: &AddressTable) -> Vec<ChannelOutput<'_>> {
    table
        .iter()
        .map(|(address, entry)| ChannelOutput {
            address,
            name: &entry.name,
            opto_slot: match entry.kind {
                ChannelKind::Opto { index } => Some(index),
                ChannelKind::Value => None,
            },
        })
        .collect()
}

/// Print the address table in address order.
pub fn print_channels(table: &AddressTable, format: OutputFormat) {
    let rows = channel_rows(table);
    match format {
        OutputFormat::Json => print_json_line(&rows),
        OutputFormat::Table => {
            let mut out = new_table(vec!["ADDR", "NAME", "OPTO SLOT"]);
            for row in &rows {
                out.add_row(vec![
                    row.address.to_string(),
                    row.name.to_string(),
                    row.opto_slot.map(|s| s.to_string()).unwrap_or_default(),
                ]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                match row.opto_slot {
                    Some(slot) => println!("{:>3} {} [slot {slot}]", row.address, row.name),
                    None => println!("{:>3} {}", row.address, row.name),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct CommandOutput<'a> {
    command: &'a str,
    payload: Vec<u8>,
    target: &'a str,
}

pub fn print_command(cmd: &OutboundCommand, target: &str, format: OutputFormat) {
    let payload = cmd.payload();
    match format {
        OutputFormat::Json => print_json_line(&CommandOutput {
            command: cmd.name(),
            payload,
            target,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "PAYLOAD", "TARGET"]);
            table.add_row(vec![cmd.name().to_string(), hex(&payload), target.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("sent {} [{}] to {target}", cmd.name(), hex(&payload)),
        OutputFormat::Raw => print_raw(&payload),
    }
}

#[derive(Serialize)]
struct PortOutput {
    path: String,
    usb: bool,
}

#[cfg(unix)]
pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<_> = ports
                .iter()
                .map(|p| PortOutput {
                    path: p.path.display().to_string(),
                    usb: p.usb,
                })
                .collect();
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["PATH", "USB"]);
            for p in ports {
                table.add_row(vec![p.path.display().to_string(), yes_no(p.usb).to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for p in ports {
                if p.usb {
                    println!("{} (usb)", p.path.display());
                } else {
                    println!("{}", p.path.display());
                }
            }
        }
    }
}

pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json_line(stats),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COUNTER", "VALUE"]);
            for (name, value) in stats_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = stats_rows(stats)
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

fn stats_rows(stats: &StatsSnapshot) -> [(&'static str, u64); 9] {
    [
        ("frames", stats.frames),
        ("published", stats.published),
        ("malformed", stats.malformed),
        ("unknown_address", stats.unknown_address),
        ("oversized", stats.oversized),
        ("publish_errors", stats.publish_errors),
        ("stalls", stats.stalls),
        ("commands_sent", stats.commands_sent),
        ("command_errors", stats.command_errors),
    ]
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json_line<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_rows_follow_address_order() {
        let table = AddressTable::default();
        let rows = channel_rows(&table);
        assert_eq!(rows.len(), table.len());
        assert!(rows.windows(2).all(|w| w[0].address < w[1].address));

        let analog0 = rows.iter().find(|r| r.address == 27).unwrap();
        assert_eq!(analog0.name, "/analog0");
        assert_eq!(analog0.opto_slot, None);

        let opto: Vec<_> = rows
            .iter()
            .filter(|r| (99..=104).contains(&r.address))
            .map(|r| r.opto_slot)
            .collect();
        assert_eq!(
            opto,
            [0, 2, 1, 3, 4, 5].map(Some).to_vec()
        );
    }

    #[test]
    fn channel_json_omits_slot_for_plain_values() {
        let table = AddressTable::from_json(
            r#"{"channels":[{"address":5,"name":"/knob"},{"address":6,"name":"/opto","opto":2}]}"#,
        )
        .unwrap();
        let json = serde_json::to_string(&channel_rows(&table)).unwrap();
        assert_eq!(
            json,
            r#"[{"address":5,"name":"/knob"},{"address":6,"name":"/opto","opto_slot":2}]"#
        );
    }

    #[test]
    fn hex_formats_frames() {
        assert_eq!(hex(&[0x0e, 0x01, 0x2c]), "0e 01 2c");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn message_json_omits_slot_for_plain_values() {
        let out = MessageOutput {
            address: 14,
            name: "/analog3",
            value: 300,
            opto_slot: None,
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(
            json,
            r#"{"address":14,"name":"/analog3","value":300,"timestamp":"0"}"#
        );
    }
}
