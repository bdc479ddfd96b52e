// Copyright 2025 Caseboard (https://github.com/caseboard)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use caseboard_server::{config::ServerConfig, run_server};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "CASEBOARD_HTTP_ADDR")]
    listen_addr: Option<String>,

    /// Anti-loop cap override
    #[arg(long, env = "CASEBOARD_MAX_TRIGGERS_PER_CASE")]
    max_triggers_per_case: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config)?;
    if let Some(addr) = args.listen_addr {
        config.server.listen_addr = addr;
    }
    if let Some(cap) = args.max_triggers_per_case {
        config.engine.max_triggers_per_case = cap;
    }

    run_server(config).await
}
