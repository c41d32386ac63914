use clap::{App, Arg};
use colored::*;
use rinnai_control::protocol::{decode_state, DeviceCommand};
use rinnai_control::simulator::SimulatedHeater;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Method, Response, Server};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, warn};

const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_SET_POINT: &str = "40";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("heater-sim")
        .version("0.1.0")
        .about("Simulated Rinnai water heater speaking the device's HTTP protocol")
        .arg(
            Arg::with_name("bind")
                .short("b")
                .long("bind")
                .value_name("ADDR")
                .help("Address to listen on")
                .takes_value(true)
                .default_value(DEFAULT_BIND),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Port to listen on")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .validator(|v| match v.parse::<u16>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Port must be a number between 0 and 65535".into()),
                }),
        )
        .arg(
            Arg::with_name("set-point")
                .short("t")
                .long("set-point")
                .value_name("CELSIUS")
                .help("Initial set point")
                .takes_value(true)
                .default_value(DEFAULT_SET_POINT)
                .validator(|v| match v.parse::<u8>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Set point must be a whole number of degrees".into()),
                }),
        )
        .arg(
            Arg::with_name("flowing")
                .long("flowing")
                .help("Start with hot water flowing (burner on)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Print every request"),
        )
        .get_matches();

    let bind = matches.value_of("bind").unwrap_or(DEFAULT_BIND);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let set_point: u8 = matches
        .value_of("set-point")
        .unwrap_or(DEFAULT_SET_POINT)
        .parse()?;
    let verbose = matches.is_present("verbose");

    let mut heater = SimulatedHeater::new(set_point);
    heater.set_water_flowing(matches.is_present("flowing"));
    let initial = decode_state(&heater.state_response())?;
    let heater = Arc::new(Mutex::new(heater));

    println!("{}", "Rinnai heater simulator".bold());
    println!("=======================");
    println!("   Set point: {}°C", initial.target_temperature.to_string().cyan());
    println!("   State: {}", serde_json::to_string(&initial)?);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let server = Server::http(addr).map_err(|e| format!("failed to bind {addr}: {e}"))?;
    info!("HTTP server listening on {}", addr);

    let clock_heater = Arc::clone(&heater);
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            clock_heater.lock().await.run_for(1);
        }
    });

    // tiny_http is blocking; the request loop gets its own thread.
    tokio::task::spawn_blocking(move || serve(&server, &heater, verbose)).await?;
    Ok(())
}

fn serve(server: &Server, heater: &Mutex<SimulatedHeater>, verbose: bool) {
    for request in server.incoming_requests() {
        let peer = request.remote_addr().map(|addr| addr.ip());
        let response = match (request.method(), peer) {
            (Method::Get, Some(peer)) => {
                let command = DeviceCommand::from_path(request.url());
                if verbose {
                    println!("{} {} {}", "→".cyan(), peer, command.to_string().yellow());
                }
                let body = heater.blocking_lock().handle(&command, peer);
                Response::from_string(body)
            }
            (Method::Get, None) => Response::from_string("unknown peer").with_status_code(400),
            (method, _) => {
                warn!("Unsupported method {:?} from {:?}", method, peer);
                Response::from_string("").with_status_code(405)
            }
        };

        if let Err(e) = request.respond(response) {
            error!("Failed to answer request: {}", e);
        }
    }
}
