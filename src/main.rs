use anyhow::Result;
use btleplug::api::Peripheral;
use clap::{Parser, Subcommand};

use idasen_control::config::Config;
use idasen_control::{BleLink, Desk, DeskError};

#[derive(Parser)]
#[command(name = "idasen-control", version, about = "Control a Linak DPG desk (IKEA Idasen) over Bluetooth LE")]
struct Cli {
    /// Bluetooth address of the desk, like ec:02:09:df:8e:d8.
    /// Falls back to the saved config, then to the first desk found.
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Remember the address used for this invocation as the default
    #[arg(long, global = true)]
    save: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan for advertising desks and list them
    List,
    /// Show the desk's name, heights and memory positions
    Show,
    /// Move the desk to a height in mm, or to a memory position like 'm1'
    Move { target: String },
    /// Store a height (in mm, or 'current') into a memory cell like 'm1'
    Set { cell: String, height: String },
    /// Clear a memory cell like 'm1' back to unset
    Clear { cell: String },
    /// Calibrate the desk's height above the floor in its lowest position
    MinHeight { mm: String },
    /// Show the desk's advertised name, or change it
    Name { new_name: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::parse();

    if let Command::List = cli.command {
        return list_desks().await;
    }

    let mut config = Config::load()?;
    let address = cli.address.clone().or_else(|| config.desk_address.clone());

    let mut desk = Desk::connect(address.as_deref()).await?;
    if cli.save {
        config.desk_address = address.clone();
        config.save()?;
    }

    let outcome = run_command(&cli.command, &mut desk).await;
    if let Err(e) = desk.disconnect().await {
        log::warn!("Disconnect failed: {}", e);
    }
    outcome
}

async fn run_command(command: &Command, desk: &mut Desk<BleLink>) -> Result<()> {
    match command {
        Command::List => unreachable!("handled before connecting"),
        Command::Show => {
            println!("Name              {}", desk.name().await?);
            println!("Current height    {:>5.0} mm", desk.height().await?);
            print_positions_report(desk).await?;
        }
        Command::Move { target } => {
            let height = match parse_memory_cell(target) {
                Some(cell) => desk
                    .memory(cell?)
                    .await?
                    .ok_or_else(|| DeskError::InvalidParameter(format!(
                        "memory cell {} is not set",
                        target
                    )))?,
                None => parse_height(target)?,
            };
            println!("Moving the desk to {:.0} mm", height);
            desk.set_height(height).await?;
            println!("Current height is {:.0} mm", desk.height().await?);
        }
        Command::Set { cell, height } => {
            let cell = parse_memory_cell(cell).ok_or_else(|| {
                DeskError::InvalidParameter(format!(
                    "memory cell '{}' is wrong, it must be like 'm1'",
                    cell
                ))
            })??;
            if height.eq_ignore_ascii_case("current") {
                let stored = desk.set_memory_to_current(cell).await?;
                println!("Wrote current height {:.0} mm into memory cell {}", stored, cell);
            } else {
                let mm = parse_height(height)?;
                println!("Writing {:.0} mm into memory cell {}", mm, cell);
                desk.set_memory(cell, mm).await?;
            }
            print_positions_report(desk).await?;
        }
        Command::Clear { cell } => {
            let cell = parse_memory_cell(cell).ok_or_else(|| {
                DeskError::InvalidParameter(format!(
                    "memory cell '{}' is wrong, it must be like 'm1'",
                    cell
                ))
            })??;
            println!("Clearing memory cell {}", cell);
            desk.clear_memory(cell).await?;
            print_positions_report(desk).await?;
        }
        Command::MinHeight { mm } => {
            let mm = parse_height(mm)?;
            println!("Writing {:.0} mm as the desk's height in the lowest position", mm);
            desk.set_min_height(mm).await?;
            print_positions_report(desk).await?;
        }
        Command::Name { new_name } => match new_name {
            Some(name) => {
                desk.set_name(name).await?;
                println!("Name changed to {}", desk.name().await?);
            }
            None => println!("{}", desk.name().await?),
        },
    }
    Ok(())
}

/// Scan and print address/name for every advertising desk.
async fn list_desks() -> Result<()> {
    println!("Please wait, scanning for desks...");
    let desks = BleLink::scan_for_desks(10).await?;

    if desks.is_empty() {
        println!("No desks found");
        return Ok(());
    }

    println!("Address\t\t\tName");
    for desk in desks {
        if let Ok(Some(props)) = desk.properties().await {
            println!(
                "{}\t{}",
                props.address,
                props.local_name.unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn print_positions_report(desk: &Desk<BleLink>) -> Result<()> {
    println!("Minimum height    {:>5.0} mm", desk.min_height());
    for cell in 1..=desk.capabilities().memory_cells {
        match desk.memory(cell).await? {
            Some(mm) => println!("Memory position {} {:>5.0} mm", cell, mm),
            None => println!("Memory position {}   not set", cell),
        }
    }
    Ok(())
}

/// Parse a memory cell argument like `m1`. `None` when the argument is not
/// in memory-cell form at all (so `move` can try it as a height instead).
fn parse_memory_cell(value: &str) -> Option<Result<u8, DeskError>> {
    let rest = value.strip_prefix('m').or_else(|| value.strip_prefix('M'))?;
    Some(rest.parse::<u8>().map_err(|_| {
        DeskError::InvalidParameter(format!("memory cell '{}' is wrong, it must be like 'm1'", value))
    }))
}

fn parse_height(value: &str) -> Result<f32, DeskError> {
    value.parse::<f32>().map_err(|_| {
        DeskError::InvalidParameter(format!(
            "height '{}' is wrong, it must be millimeters like '1100'",
            value
        ))
    })
}
