use crate::config::TileSourceConfig;
use crate::models::TileCoordinate;

use super::FetchError;

/// A configured tile server.
#[derive(Debug, Clone)]
pub struct TileSource {
    config: TileSourceConfig,
}

impl TileSource {
    pub fn new(config: TileSourceConfig) -> Self {
        Self { config }
    }

    pub fn url_template(&self) -> &str {
        &self.config.url_template
    }

    pub fn attribution(&self) -> &str {
        &self.config.attribution
    }

    pub fn max_zoom(&self) -> u8 {
        self.config.max_zoom
    }

    /// Whether the server can serve `coord` at all.
    pub fn check(&self, coord: &TileCoordinate) -> Result<(), FetchError> {
        if coord.zoom > self.config.max_zoom {
            return Err(FetchError::ZoomOutOfRange {
                zoom: coord.zoom,
                max_zoom: self.config.max_zoom,
            });
        }
        Ok(())
    }

    /// Resolve `template` for `coord` using this source's subdomain pool.
    pub fn resolve(&self, template: &str, coord: &TileCoordinate) -> String {
        resolve_template(template, coord, &self.config.subdomains)
    }

    /// URL for `coord` on this source.
    pub fn url(&self, coord: &TileCoordinate) -> Result<String, FetchError> {
        self.check(coord)?;
        Ok(self.resolve(&self.config.url_template, coord))
    }
}

/// Substitute `{z}`, `{x}`, `{y}` and `{s}`. The subdomain is picked from the
/// tile position so a given tile always hits the same host.
pub fn resolve_template(template: &str, coord: &TileCoordinate, subdomains: &[String]) -> String {
    let mut url = template
        .replace("{z}", &coord.zoom.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string());

    if url.contains("{s}") {
        let subdomain = if subdomains.is_empty() {
            ""
        } else {
            let index = (coord.x as usize + coord.y as usize) % subdomains.len();
            subdomains[index].as_str()
        };
        url = url.replace("{s}", subdomain);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subdomains() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn test_resolve_plain_template() {
        let url = resolve_template("https://tiles.example/{z}/{x}/{y}.png", &TileCoordinate::new(3, 1, 2), &[]);
        assert_eq!(url, "https://tiles.example/3/1/2.png");
    }

    #[test]
    fn test_resolve_subdomain_rotation() {
        let template = "https://{s}.tiles.example/{z}/{x}/{y}.png";
        let subs = subdomains();
        assert_eq!(
            resolve_template(template, &TileCoordinate::new(1, 0, 0), &subs),
            "https://a.tiles.example/1/0/0.png"
        );
        assert_eq!(
            resolve_template(template, &TileCoordinate::new(1, 1, 0), &subs),
            "https://b.tiles.example/1/1/0.png"
        );
        assert_eq!(
            resolve_template(template, &TileCoordinate::new(2, 1, 1), &subs),
            "https://c.tiles.example/2/1/1.png"
        );
        // Same tile, same host
        assert_eq!(
            resolve_template(template, &TileCoordinate::new(2, 1, 1), &subs),
            resolve_template(template, &TileCoordinate::new(2, 1, 1), &subs)
        );
    }

    #[test]
    fn test_resolve_subdomain_without_pool() {
        let url = resolve_template("https://{s}tiles.example/{z}/{x}/{y}", &TileCoordinate::new(0, 0, 0), &[]);
        assert_eq!(url, "https://tiles.example/0/0/0");
    }

    #[test]
    fn test_max_zoom_enforced() {
        let source = TileSource::new(TileSourceConfig {
            max_zoom: 5,
            ..TileSourceConfig::default()
        });
        assert!(source.url(&TileCoordinate::new(5, 0, 0)).is_ok());
        assert!(matches!(
            source.url(&TileCoordinate::new(6, 0, 0)),
            Err(FetchError::ZoomOutOfRange { zoom: 6, max_zoom: 5 })
        ));
    }
}
