//! Command-line interface for feature-sync
//!
//! # Usage Examples
//!
//! ## Feature service -> PostgreSQL
//! ```bash
//! feature-sync agol2pg --service gis \
//!   --url https://services.arcgis.com/abc/arcgis/rest/services/Parcels/FeatureServer/0 \
//!   --table parcels --target-srid 3857 \
//!   --save-attachments --bucket s3://gis-attachments
//! ```
//!
//! ## Relocating attachment content
//! ```bash
//! feature-sync attachments --service gis --table parcels --bucket s3://gis-attachments
//! ```
//!
//! ## PostgreSQL -> feature service
//! ```bash
//! # Creates a hosted service named parcels_Feature_Service when --url is omitted
//! feature-sync pg2agol --service gis --table parcels --ignore created_by --truncate
//! ```
//!
//! ## Archiving
//! ```bash
//! feature-sync backup --owner gis_admin --max-items 50 \
//!   --remove-archives --duration 2w --bucket s3://gis-backups
//! ```
//!
//! ## Other
//! ```bash
//! feature-sync function --service gis --schema etl --name refresh_views
//! feature-sync services
//! ```
//!
//! Credentials come from `ARCGIS_USER`/`ARCGIS_PASSWORD` (or
//! `ARCGIS_CLIENT_ID`/`ARCGIS_CLIENT_SECRET`), connections from the
//! PostgreSQL service file named by `PGSERVICEFILE`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use feature_sync::config::{
    parse_duration_to_days, AttachmentSyncConfig, BackupConfig, ForwardConfig, ReverseConfig,
    DEFAULT_FORWARD_BATCH, DEFAULT_GEOMETRY_COLUMN, DEFAULT_MAX_ITEMS, DEFAULT_OID_COLUMN,
    DEFAULT_REVERSE_BATCH, DEFAULT_REVERSE_TARGET_SRID, DEFAULT_SCHEMA,
};
use feature_sync::connect::{connect_to_portal, connect_to_postgresql, load_service_file};
use feature_sync::loader::Ogr2OgrLoader;
use feature_sync::progress::DEFAULT_PROGRESS_CAPACITY;
use feature_sync::run::spawn_run;
use feature_sync::{attachments, backup, functions, pipeline, reverse, ArcGisOpts, PgOpts};
use feature_sync_bucket::BucketLocation;
use feature_sync_postgresql::TableDescriptor;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "feature-sync")]
#[command(about = "Move features and attachments between hosted feature services and PostgreSQL")]
#[command(long_about = None)]
struct Cli {
    /// Forward debug-level progress lines
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a feature layer into a PostgreSQL table
    Agol2pg {
        #[command(flatten)]
        pg: PgOpts,

        #[command(flatten)]
        arcgis: ArcGisOpts,

        /// Feature layer URL
        #[arg(long)]
        url: String,

        #[arg(long, default_value = DEFAULT_SCHEMA)]
        schema: String,

        #[arg(long)]
        table: String,

        /// Object-id column created in the table
        #[arg(long, default_value = DEFAULT_OID_COLUMN)]
        oid_column: String,

        #[arg(long, default_value = DEFAULT_GEOMETRY_COLUMN)]
        geometry_column: String,

        /// Features requested per page
        #[arg(long, default_value_t = DEFAULT_FORWARD_BATCH)]
        batch_size: usize,

        /// Source spatial reference, overriding the layer's
        #[arg(long)]
        source_srid: Option<i64>,

        /// Reproject geometries to this spatial reference
        #[arg(long)]
        target_srid: Option<i64>,

        /// Also copy attachment records and relocate their content
        #[arg(long)]
        save_attachments: bool,

        /// Bucket receiving attachment content (s3://bucket or a directory)
        #[arg(long, env = "BUCKET")]
        bucket: Option<String>,

        /// ogr2ogr executable
        #[arg(long, default_value = "ogr2ogr")]
        ogr2ogr: PathBuf,
    },

    /// Move attachment content of a table's attachment records into a bucket
    Attachments {
        #[command(flatten)]
        pg: PgOpts,

        #[command(flatten)]
        arcgis: ArcGisOpts,

        #[arg(long, default_value = DEFAULT_SCHEMA)]
        schema: String,

        /// Parent table; records live in `<table>_attach`
        #[arg(long)]
        table: String,

        #[arg(long, env = "BUCKET")]
        bucket: String,
    },

    /// Publish a PostgreSQL table to a feature layer
    Pg2agol {
        #[command(flatten)]
        pg: PgOpts,

        #[command(flatten)]
        arcgis: ArcGisOpts,

        #[arg(long, default_value = DEFAULT_SCHEMA)]
        schema: String,

        #[arg(long)]
        table: String,

        /// Target layer URL; a new hosted service is created when omitted
        #[arg(long)]
        url: Option<String>,

        #[arg(long, default_value = DEFAULT_GEOMETRY_COLUMN)]
        geometry_column: String,

        /// Column excluded from the published attributes (repeatable)
        #[arg(long = "ignore", value_name = "COLUMN")]
        ignore: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_REVERSE_TARGET_SRID)]
        target_srid: i64,

        /// Features per applyEdits request
        #[arg(long, default_value_t = DEFAULT_REVERSE_BATCH)]
        batch_size: usize,

        /// Delete every feature of the layer first
        #[arg(long)]
        truncate: bool,
    },

    /// Export feature services to a bucket as file geodatabases
    Backup {
        #[command(flatten)]
        arcgis: ArcGisOpts,

        /// Owner whose feature services are archived (repeatable)
        #[arg(long = "owner", value_name = "USER", required = true)]
        owners: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_MAX_ITEMS)]
        max_items: usize,

        /// Delete archives older than --duration
        #[arg(long)]
        remove_archives: bool,

        /// Retention, e.g. `30`, `30d` or `2w`
        #[arg(long)]
        duration: Option<String>,

        #[arg(long, env = "BUCKET")]
        bucket: String,

        /// Directory for downloaded exports (a temporary one by default)
        #[arg(long)]
        download_dir: Option<PathBuf>,
    },

    /// Call a stored function
    Function {
        #[command(flatten)]
        pg: PgOpts,

        #[arg(long, default_value = DEFAULT_SCHEMA)]
        schema: String,

        /// Function name
        #[arg(long)]
        name: String,
    },

    /// List the services of the PostgreSQL service file
    Services {
        #[arg(long, env = "PGSERVICEFILE")]
        service_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Commands::Agol2pg {
            pg,
            arcgis,
            url,
            schema,
            table,
            oid_column,
            geometry_column,
            batch_size,
            source_srid,
            target_srid,
            save_attachments,
            bucket,
            ogr2ogr,
        } => {
            let config = ForwardConfig {
                service: pg.service.clone(),
                layer_url: url,
                schema,
                table,
                oid_column,
                geometry_column,
                batch_size,
                source_srid,
                target_srid,
                save_attachments,
                bucket,
            };
            config.validate()?;

            let client = connect_to_portal(&arcgis)?;
            let store = connect_to_postgresql(&pg).await?;
            let loader = Ogr2OgrLoader::new(&pg.service)
                .with_service_file(pg.service_file.clone())
                .with_program(ogr2ogr);
            let bucket = match (&config.bucket, config.save_attachments) {
                (Some(uri), true) => Some(BucketLocation::parse(uri)?.open().await?),
                _ => None,
            };

            spawn_run(DEFAULT_PROGRESS_CAPACITY, verbose, move |progress| async move {
                pipeline::agol_to_pg(
                    &client,
                    &store,
                    &loader,
                    bucket.as_deref(),
                    &config,
                    &progress,
                )
                .await?;
                Ok(())
            })
            .follow(|line| println!("{line}"))
            .await?;
        }
        Commands::Attachments {
            pg,
            arcgis,
            schema,
            table,
            bucket,
        } => {
            let config = AttachmentSyncConfig {
                service: pg.service.clone(),
                schema,
                table,
                bucket,
            };
            let client = connect_to_portal(&arcgis)?;
            let store = connect_to_postgresql(&pg).await?;
            let bucket = BucketLocation::parse(&config.bucket)?.open().await?;
            let table = TableDescriptor::new(&config.schema, &config.table, DEFAULT_OID_COLUMN);

            spawn_run(DEFAULT_PROGRESS_CAPACITY, verbose, move |progress| async move {
                attachments::sync_attachments(&store, &client, &*bucket, &table, &progress)
                    .await?;
                Ok(())
            })
            .follow(|line| println!("{line}"))
            .await?;
        }
        Commands::Pg2agol {
            pg,
            arcgis,
            schema,
            table,
            url,
            geometry_column,
            ignore,
            target_srid,
            batch_size,
            truncate,
        } => {
            let config = ReverseConfig {
                service: pg.service.clone(),
                schema,
                table,
                layer_url: url,
                geometry_column,
                ignore,
                target_srid,
                batch_size,
                truncate,
            };
            config.validate()?;
            let client = connect_to_portal(&arcgis)?;
            let store = connect_to_postgresql(&pg).await?;

            spawn_run(DEFAULT_PROGRESS_CAPACITY, verbose, move |progress| async move {
                reverse::transfer_to_service(&client, &client, &store, &config, &progress).await?;
                Ok(())
            })
            .follow(|line| println!("{line}"))
            .await?;
        }
        Commands::Backup {
            arcgis,
            owners,
            max_items,
            remove_archives,
            duration,
            bucket,
            download_dir,
        } => {
            let duration_days = duration
                .as_deref()
                .map(parse_duration_to_days)
                .transpose()
                .context("Invalid --duration")?;
            let config = BackupConfig {
                owners,
                max_items,
                remove_archives,
                duration_days,
                download_dir,
            };
            config.validate()?;
            let client = connect_to_portal(&arcgis)?;
            let bucket = BucketLocation::parse(&bucket)?.open().await?;

            spawn_run(DEFAULT_PROGRESS_CAPACITY, verbose, move |progress| async move {
                backup::backup(&client, &*bucket, &config, &progress).await?;
                Ok(())
            })
            .follow(|line| println!("{line}"))
            .await?;
        }
        Commands::Function { pg, schema, name } => {
            let store = connect_to_postgresql(&pg).await?;

            spawn_run(DEFAULT_PROGRESS_CAPACITY, verbose, move |progress| async move {
                functions::run_function(&store, &schema, &name, &progress).await
            })
            .follow(|line| println!("{line}"))
            .await?;
        }
        Commands::Services { service_file } => {
            let services = load_service_file(service_file.as_deref())?;
            for name in services.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
