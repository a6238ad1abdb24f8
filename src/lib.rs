/*!
# Demografia

A small authenticated dashboard of Polish demographic charts, built in Rust.

## Overview

Two statistical tables published as spreadsheets are sliced at fixed
positions, reshaped into year-indexed series, and rendered as five charts
(births and deaths, natural increase, birth rate by age of mother, mean age of
mother, marriages and births). Logged-in users see the charts on a dashboard.

## Architecture

### Data pipeline
- **loader** - Reads a fixed row/column window out of a spreadsheet sheet
- **series** - Year-indexed columns and derived differences
  (natural increase, migration balance)
- **graph** - Renders the five SVG charts into the chart directory
- **pipeline** - Composes the three steps into `regenerate_charts`

### Accounts
- **users** - Credential store (JSON file or in-memory)
- **login** - Argon2 password hashing, sessions, authentication,
  registration, admin bootstrap and the auth handlers

### Web layer (feature `web`)
- **app** - Application context, router and dashboard handlers

## REST Endpoints

- `GET /`, `POST /` - Login form and login
- `GET /register`, `POST /register` - Registration
- `GET /dashboard` - Charts (authenticated)
- `POST /dashboard/regenerate` - Regenerate charts (authenticated)
- `GET /logout` - End the session
- `GET /charts/{file}` - Rendered chart images
*/

#[cfg(feature = "web")]
pub mod app;
pub mod config;
pub mod error;
pub mod graph;
pub mod loader;
pub mod login;
pub mod pipeline;
pub mod series;
pub mod users;

pub use config::Config;
pub use error::*;
pub use pipeline::{ChartRun, SeriesSet, build_series, regenerate_charts};
pub use series::{DerivedSeries, YearSeries, difference};
pub use users::{CredentialStore, JsonUserStore, MemoryUserStore, UserRecord};
