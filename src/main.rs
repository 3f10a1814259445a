//! pinlink
//!
//! Control microcontroller boards (pins, modes, PWM, firmware queries) from
//! the command line.
//!
//! # Usage
//!
//! ```bash
//! # List built-in boards
//! pinlink boards list
//!
//! # Show the pin layout of a board
//! pinlink boards show nanoatmega328
//!
//! # List available serial ports
//! pinlink ports
//!
//! # Switch on pin 13
//! pinlink -b nanoatmega328 -t /dev/ttyUSB0 pin 13 high
//!
//! # Same, through a named board from ~/.pinlink.toml
//! pinlink -B nano1 pin D13 high
//!
//! # Query the firmware version, keeping the board alive via the proxy
//! pinlink -B nano1 --proxy firmware
//!
//! # Check that socat is installed
//! pinlink dependencies
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};

use pinlink::board::{board_names, get_builtin};
use pinlink::serial::port::print_ports;
use pinlink::serial::proxy::{find_program, SOCAT};
use pinlink::{
    BoardCatalog, BoardDescriptor, ConnectionSettings, ControllerConfig, DeviceController,
    Overrides, Reply, SerialProxy, UserConfig,
};

/// pinlink
///
/// Pin-level control of microcontroller boards over a serial link
#[derive(Parser)]
#[command(name = "pinlink")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Control microcontroller board pins over a serial link")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Alternate configuration file (default: ~/.pinlink.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Named board from the configuration file
    #[arg(short = 'B', long, global = true)]
    buddy: Option<String>,

    /// Board type (e.g., uno, nanoatmega328)
    #[arg(short = 'b', long, global = true)]
    board: Option<String>,

    /// Serial port of the board
    #[arg(short = 't', long, global = true)]
    tty: Option<String>,

    /// Baud rate (overrides the board file)
    #[arg(short = 's', long, global = true)]
    baudrate: Option<u32>,

    /// Explicit board descriptor file
    #[arg(short = 'p', long, global = true)]
    boardfile: Option<PathBuf>,

    /// Talk to the board through the serial proxy
    #[arg(long, global = true)]
    proxy: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Board descriptor operations
    #[command(subcommand)]
    Boards(BoardCommands),

    /// List available serial ports
    Ports,

    /// Control a single pin
    Pin {
        /// Physical id or alias (e.g., 13, D13, A0)
        pin: String,

        #[command(subcommand)]
        action: PinAction,
    },

    /// Switch an on-board LED
    Led {
        /// LED number (1 for led1; empty string for the unnumbered led)
        led: String,

        #[arg(value_enum)]
        state: LedState,
    },

    /// Show the firmware version of the board
    Firmware,

    /// Show free memory on the board
    Free,

    /// Serial proxy operations
    #[command(subcommand)]
    Proxy(ProxyCommands),

    /// Check that external programs are installed
    Dependencies,
}

#[derive(Subcommand)]
enum BoardCommands {
    /// List built-in boards
    List,

    /// Show the pin layout of a board
    Show {
        /// Board name (e.g., uno, nanoatmega328)
        board: String,
    },
}

#[derive(Subcommand)]
enum PinAction {
    /// Drive the pin high
    High,
    /// Drive the pin low
    Low,
    /// Read the pin value
    Read,
    /// Write a PWM duty cycle
    Pwm {
        #[arg(value_parser = clap::value_parser!(u8))]
        value: u8,
    },
    /// Set the pin mode (input, output, input_pullup, pwm)
    Mode { mode: String },
    /// Ask the board for the pin mode
    GetMode,
}

#[derive(Clone, Copy, ValueEnum)]
enum LedState {
    On,
    Off,
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// Start the serial proxy for the board's tty
    Start {
        /// Run socat with hex dumps and verbose diagnostics
        #[arg(long)]
        debug: bool,
    },
    /// Stop the serial proxy for the board's tty
    Stop,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
        if e
            .downcast_ref::<pinlink::Error>()
            .map_or(false, pinlink::Error::is_lookup_error)
        {
            eprintln!(
                "Use {} to see the pins and LEDs of a board",
                "pinlink boards show <board>".cyan()
            );
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let user_config = UserConfig::load_or_default(cli.config.as_deref());
    init_logging(
        cli.log_level.as_deref(),
        user_config
            .as_ref()
            .ok()
            .and_then(|c| c.log_level.as_deref()),
    );
    let user_config = user_config?;

    match &cli.command {
        Commands::Boards(cmd) => handle_boards(cmd, &user_config),
        Commands::Ports => {
            print_ports()?;
            Ok(())
        }
        Commands::Proxy(cmd) => handle_proxy(cmd, &cli, &user_config),
        Commands::Dependencies => {
            check_dependencies();
            Ok(())
        }
        Commands::Pin { pin, action } => {
            let mut controller = connect(&cli, &user_config)?;
            let result = handle_pin(&mut controller, pin, action);
            controller.close();
            result
        }
        Commands::Led { led, state } => {
            let mut controller = connect(&cli, &user_config)?;
            let result = controller.get_led(led).and_then(|mut pin| match state {
                LedState::On => pin.high(),
                LedState::Off => pin.low(),
            });
            controller.close();
            print_reply(&result?);
            Ok(())
        }
        Commands::Firmware => {
            let mut controller = connect(&cli, &user_config)?;
            let version = controller.firmware_version();
            controller.close();
            print_value("Firmware version", version?);
            Ok(())
        }
        Commands::Free => {
            let mut controller = connect(&cli, &user_config)?;
            let free = controller.free_memory();
            controller.close();
            print_value("Free memory", free?);
            Ok(())
        }
    }
}

/// `--log-level` beats `RUST_LOG`, which beats the config file
fn init_logging(cli_level: Option<&str>, config_level: Option<&str>) {
    let default = config_level.unwrap_or("info");
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
    if let Some(level) = cli_level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn overrides(cli: &Cli) -> Overrides {
    Overrides {
        buddy: cli.buddy.clone(),
        board: cli.board.clone(),
        tty: cli.tty.clone(),
        baudrate: cli.baudrate,
        boardfile: cli.boardfile.clone(),
        use_proxy: cli.proxy,
    }
}

fn resolve(cli: &Cli, user_config: &UserConfig) -> Result<(ConnectionSettings, BoardDescriptor)> {
    let connection = user_config.resolve(&overrides(cli))?;
    let catalog = BoardCatalog::from_settings(&user_config.settings());
    let descriptor = catalog.resolve(&connection.board, connection.boardfile.as_deref())?;
    Ok((connection, descriptor))
}

fn connect(cli: &Cli, user_config: &UserConfig) -> Result<DeviceController> {
    let (connection, descriptor) = resolve(cli, user_config)?;
    let config = ControllerConfig::from_connection(&connection, &user_config.settings());
    let mut controller = DeviceController::new(descriptor, config);
    controller.open()?;
    Ok(controller)
}

fn handle_pin(controller: &mut DeviceController, pin: &str, action: &PinAction) -> Result<()> {
    let mut pin = controller.get_pin(pin)?;
    let reply = match action {
        PinAction::High => pin.high()?,
        PinAction::Low => pin.low()?,
        PinAction::Read => pin.read()?,
        PinAction::Pwm { value } => pin.pwm(*value)?,
        PinAction::GetMode => pin.mode().get_mode()?,
        PinAction::Mode { mode } => match pin.set_mode(mode)? {
            Some(reply) => reply,
            None => bail!(
                "Could not set mode {} for pin {} (expected input, output, input_pullup or pwm)",
                mode,
                pin.physical_id()
            ),
        },
    };
    print_reply(&reply);
    Ok(())
}

fn print_reply(reply: &Reply) {
    match reply.payload() {
        Some(payload) => println!("{}", payload),
        None => println!("{}", "[OK] Sent".green()),
    }
}

fn print_value(label: &str, value: Option<String>) {
    match value {
        Some(value) => println!("{}: {}", label.cyan(), value.white().bold()),
        None => println!("{}", "[OK] Sent".green()),
    }
}

fn check_dependencies() {
    match find_program(SOCAT) {
        Some(path) => println!(
            "{} {} found in {}",
            "[OK]".green().bold(),
            SOCAT,
            path.display()
        ),
        None => println!(
            "{} {} not found; the serial proxy does not work",
            "[MISSING]".red().bold(),
            SOCAT
        ),
    }
}

fn handle_proxy(cmd: &ProxyCommands, cli: &Cli, user_config: &UserConfig) -> Result<()> {
    let (connection, descriptor) = resolve(cli, user_config)?;
    let baudrate = connection
        .baudrate
        .unwrap_or_else(|| descriptor.baudrate_or(user_config.settings().default_baudrate));

    match cmd {
        ProxyCommands::Start { debug } => {
            let mut proxy = SerialProxy::new(&connection.tty, baudrate).with_debug(*debug);
            if proxy.start()? {
                println!(
                    "{} Serial proxy for {} available at {}",
                    "[OK]".green().bold(),
                    connection.tty,
                    proxy.proxy_tty().display().to_string().white()
                );
            } else {
                println!(
                    "{} Serial proxy already running at {}",
                    "[*]".cyan().bold(),
                    proxy.proxy_tty().display()
                );
            }
        }
        ProxyCommands::Stop => {
            let mut proxy = SerialProxy::new(&connection.tty, baudrate);
            proxy.stop()?;
            println!(
                "{} Serial proxy at {} stopped",
                "[OK]".green().bold(),
                proxy.proxy_tty().display()
            );
        }
    }

    Ok(())
}

fn handle_boards(cmd: &BoardCommands, user_config: &UserConfig) -> Result<()> {
    match cmd {
        BoardCommands::List => {
            println!("{}", "=".repeat(60));
            println!("{}", "Built-in Boards".cyan().bold());
            println!("{}", "=".repeat(60));

            for name in board_names() {
                if let Some(builtin) = get_builtin(name) {
                    let descriptor = BoardDescriptor::from_yaml_str(builtin.source)?;
                    println!("\n  {}: {}", name.white().bold(), builtin.name);
                    println!(
                        "    Pins: {} digital, {} analog, {} PWM",
                        descriptor.num_digital_pins(),
                        descriptor.num_analog_pins(),
                        descriptor.num_pwm_pins()
                    );
                    if let Some(baudrate) = descriptor.baudrate() {
                        println!("    Default baud: {}", baudrate);
                    }
                }
            }

            println!("\n{}", "=".repeat(60));
            println!(
                "Use {} to see the pin layout",
                "pinlink boards show <board>".cyan()
            );
        }

        BoardCommands::Show { board } => {
            let catalog = BoardCatalog::from_settings(&user_config.settings());
            let descriptor = catalog.descriptor_for(board)?;
            print_board(board, &descriptor);
        }
    }

    Ok(())
}

fn print_board(board: &str, descriptor: &BoardDescriptor) {
    println!("{}", "=".repeat(70));
    println!("{}", format!("Board: {}", board).cyan().bold());
    println!("{}", "=".repeat(70));

    let source = descriptor
        .source()
        .map(Path::display)
        .map(|p| p.to_string())
        .unwrap_or_else(|| "built-in".to_string());
    println!("\n{}", "Basic Information:".white().bold());
    println!("  Source: {}", source);
    match descriptor.baudrate() {
        Some(baudrate) => println!("  Baud rate: {}", baudrate),
        None => println!("  Baud rate: {}", "not set".dimmed()),
    }
    println!(
        "  Pins: {} ({} digital, {} analog, {} PWM)",
        descriptor.num_physical_pins(),
        descriptor.num_digital_pins(),
        descriptor.num_analog_pins(),
        descriptor.num_pwm_pins()
    );

    println!("\n{}", "Pins:".white().bold());
    for spec in descriptor.pins() {
        let kind = if spec.is_analog() {
            "analog".yellow()
        } else {
            "digital".normal()
        };
        let mode = spec
            .pin_mode
            .map(|m| m.to_string())
            .unwrap_or_default();
        println!(
            "  {:>3}  {:<5} {:<8} {:<14} {}",
            spec.physical_id,
            spec.alias.as_deref().unwrap_or("-"),
            kind,
            spec.extra.join(","),
            mode.dimmed()
        );
    }

    if !descriptor.leds().is_empty() {
        println!("\n{}", "LEDs:".white().bold());
        for (label, pin) in descriptor.leds() {
            println!("  {} -> {}", label.cyan(), pin);
        }
    }

    for (title, buses) in [
        ("I2C:", descriptor.i2c_interfaces()),
        ("SPI:", descriptor.spi_interfaces()),
    ] {
        if buses.is_empty() {
            continue;
        }
        println!("\n{}", title.white().bold());
        for (bus, roles) in buses {
            let roles: Vec<String> = roles
                .iter()
                .map(|(role, pin)| format!("{}={}", role, pin))
                .collect();
            println!("  bus {}: {}", bus, roles.join(" "));
        }
    }

    println!("\n{}", "=".repeat(70));
}
