use std::fs;
use std::path::PathBuf;
use std::process::exit;

use structopt::StructOpt;

use crate::processor::{load_sim_config, Processor, SimConfig};

mod errors;
mod instructions;
mod processor;
#[cfg(test)]
mod processor_tests;
mod register_status;
mod reorder_buffer;
mod reservation_station;

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo Simulator")]
struct Opt {
    /// Path of the program file to load
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Print the full processor state as YAML after every cycle
    #[structopt(short, long)]
    state: bool,

    /// Safety bound on the number of simulated cycles
    #[structopt(long, default_value = "1000000")]
    max_cycles: u64,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let config = match &opt.config {
        Some(path) => match load_sim_config(path.to_str().unwrap()) {
            Ok(config) => config,
            Err(error) => {
                println!("Failed to load {}. Cause: {}", path.display(), error);
                exit(1);
            }
        },
        None => SimConfig::default(),
    };

    let path = opt.file.to_str().unwrap();
    println!("Loading {}", path);
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            println!("Failed to read {}. Cause: {}", path, error);
            exit(1);
        }
    };

    let lines: Vec<&str> = source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let mut processor = Processor::new(&config);
    if let Err(error) = processor.load_program(&lines) {
        println!("Loading program '{}' failed. Cause: {}", path, error);
        exit(1);
    }

    for _ in 0..opt.max_cycles {
        let more = match processor.step() {
            Ok(more) => more,
            Err(error) => {
                println!("Simulation fault: {}", error);
                exit(1);
            }
        };

        if opt.state {
            match serde_yaml::to_string(&processor.get_state()) {
                Ok(rendered) => println!("{}", rendered),
                Err(error) => println!("Failed to render state. Cause: {}", error),
            }
        }

        if !more {
            break;
        }
    }

    let metrics = processor.get_metrics();
    println!(
        "[Cycles:{}][Instructions:{}][Committed:{}][Bubbles:{}][IPC={:.2}]",
        metrics.total_cycles,
        metrics.total_instructions,
        metrics.committed_instructions,
        metrics.bubble_cycles,
        metrics.ipc
    );
    println!("Program complete!");
}
