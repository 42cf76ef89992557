mod cli;

use std::ops::ControlFlow;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;

use gtd::board::{self, Column};
use gtd::client::Client;
use gtd::config::{self, ServerConfig};
use gtd::model::{NewTask, PositionUpdate, TaskReplace};
use gtd::reconnect::{self, Backoff};
use gtd::server;

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Command::Serve { debug: true, .. });
    config::init_logging(debug);
    let client = Client::new(&cli.server);

    match cli.command {
        Command::Serve {
            db,
            host,
            port,
            debug,
            sweep_interval,
            no_sweep_on_read,
        } => {
            let mut config = ServerConfig::new(config::resolve_db_path(db)?);
            config.host = host;
            config.port = port;
            config.debug = debug;
            config.sweep_interval = config::sweep_interval(sweep_interval);
            config.sweep_on_read = !no_sweep_on_read;
            server::serve(config).await?;
        }

        Command::List { category, json } => {
            let tasks = client.list(category).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print!("{}", board::format_task_list(&tasks));
            }
        }

        Command::Board { category } => {
            let columns = match category {
                Some(c) => vec![Column::parse(&c)?],
                None => Column::all(),
            };
            let tasks = client.list(None).await?;
            print!("{}", board::format_board(&tasks, &columns, Utc::now()));
        }

        Command::Add {
            title,
            desc,
            category,
            priority,
            due,
            focus,
            time,
            energy,
        } => {
            let task = client
                .create(&NewTask {
                    title,
                    description: desc,
                    category,
                    priority,
                    due_date: due,
                    focused: focus.then_some(true),
                    time_estimate: time,
                    energy_level: energy,
                })
                .await?;
            println!("{}", task.id);
            eprintln!("Added task #{} '{}' to {}", task.id, task.title, task.category);
        }

        Command::Edit {
            id,
            title,
            desc,
            category,
            priority,
            due,
            clear_due,
            time,
            energy,
        } => {
            let current = client.get(id).await?;
            let mut body = TaskReplace::from(&current);
            if let Some(t) = title {
                body.title = t;
            }
            if desc.is_some() {
                body.description = desc;
            }
            if let Some(c) = category {
                body.category = c;
            }
            if priority.is_some() {
                body.priority = priority;
            }
            if clear_due {
                body.due_date = None;
            } else if due.is_some() {
                body.due_date = due;
            }
            if time.is_some() {
                body.time_estimate = time;
            }
            if energy.is_some() {
                body.energy_level = energy;
            }
            client.replace(id, &body).await?;
            eprintln!("Updated task #{id}");
        }

        Command::Done { id } => {
            let current = client.get(id).await?;
            let mut body = TaskReplace::from(&current);
            body.completed = Some(!current.completed);
            let task = client.replace(id, &body).await?;
            if task.completed {
                eprintln!("Marked #{id} as done");
            } else {
                eprintln!("Reopened #{id}");
            }
        }

        Command::Focus { id, off } => {
            client.set_focus(id, !off).await?;
            if off {
                eprintln!("Unfocused #{id}");
            } else {
                eprintln!("Focused #{id}");
            }
        }

        Command::Move {
            id,
            category,
            position,
        } => {
            client
                .set_position(id, PositionUpdate { position, category })
                .await?;
            eprintln!("Moved #{id} to {category} at position {position}");
        }

        Command::Rm { id } => {
            client.delete(id).await?;
            eprintln!("Removed #{id}");
        }

        Command::Watch { json } => {
            let url = client.ws_url()?;
            reconnect::follow(&url, Backoff::default(), |event| {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => log::warn!("Failed to encode event: {e}"),
                    }
                } else {
                    println!("{}", board::format_event(&event));
                }
                ControlFlow::Continue(())
            })
            .await?;
        }
    }

    Ok(())
}
