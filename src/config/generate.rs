pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# PKGSTATS CONFIGURATION
# =============================================================================
# pkgstats accepts package download events over HTTP and records them in one
# or both storage targets:
#
#   database.record_downloads:  one row per download in the gallery database
#   catalog.enabled:            batched, append-only catalog on local disk
#
# At least one target must be enabled.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/pkgstats/config.yml
#   3. /etc/pkgstats/config.yml
#
# Values may reference environment variables with $env{NAME}.

# =============================================================================
# SERVER
# =============================================================================
server:
  # POST download events to http://<listen>/DownloadEvent
  listen: 127.0.0.1:12345

# =============================================================================
# DATABASE
# =============================================================================
# The gallery database is used to check that a package version exists before
# its downloads are recorded. Both targets need it.
database:
  path: ~/.local/share/pkgstats/gallery.duckdb
  # Upper bound for a single query
  command_timeout: 5s
  record_downloads: true

# =============================================================================
# CATALOG (optional)
# =============================================================================
catalog:
  enabled: true
  directory: ~/.local/share/pkgstats/catalog
  base_address: http://localhost:8000/catalog
  # Each instance writes its own catalog under <directory>/<instance_id>.
  # Defaults to $WEBSITE_INSTANCE_ID, then the hostname.
  # instance_id: A1B2C3D4
  # Catalog items per page
  page_size: 500
  # Downloads per catalog item
  batch_size: 1000
  # A partially filled item is written after this long without downloads
  flush_period: 60s
"#
    .to_string()
}
