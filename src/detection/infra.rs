//! Infrastructure-sharing detector (spec.md §4.6), grounded on
//! `original_source/.../detection/infra.py`. Profiles two domains
//! concurrently across DNS, WHOIS, hosting/ASN, analytics-tag, and SSL
//! signals, then scores every pair by a fixed signal-weight table.
//! Pattern tables (registrar normalization, ASN/IP provider lookup,
//! analytics/CMS regexes) are reproduced verbatim from the original.

use std::collections::HashSet;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::InfraSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfraSignalType {
	SameRegistrar,
	SameNameserver,
	SameIp,
	SameAsn,
	SameHosting,
	SameCdn,
	SameAnalytics,
	SameGtm,
	SamePixel,
	SameAdsense,
	SameSslIssuer,
	SameCms,
	SslSanOverlap,
}

impl InfraSignalType {
	pub fn weight(self) -> f64 {
		match self {
			InfraSignalType::SameRegistrar => 0.5,
			InfraSignalType::SameNameserver => 1.5,
			InfraSignalType::SameIp => 3.0,
			InfraSignalType::SameAsn => 0.5,
			InfraSignalType::SameHosting => 0.3,
			InfraSignalType::SameCdn => 0.2,
			InfraSignalType::SameAnalytics => 4.0,
			InfraSignalType::SameGtm => 4.5,
			InfraSignalType::SamePixel => 3.5,
			InfraSignalType::SameAdsense => 5.0,
			InfraSignalType::SameSslIssuer => 0.3,
			InfraSignalType::SameCms => 0.2,
			InfraSignalType::SslSanOverlap => 4.0,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			InfraSignalType::SameRegistrar => "same_registrar",
			InfraSignalType::SameNameserver => "same_nameserver",
			InfraSignalType::SameIp => "same_ip",
			InfraSignalType::SameAsn => "same_asn",
			InfraSignalType::SameHosting => "same_hosting",
			InfraSignalType::SameCdn => "same_cdn",
			InfraSignalType::SameAnalytics => "same_analytics",
			InfraSignalType::SameGtm => "same_gtm",
			InfraSignalType::SamePixel => "same_pixel",
			InfraSignalType::SameAdsense => "same_adsense",
			InfraSignalType::SameSslIssuer => "same_ssl_issuer",
			InfraSignalType::SameCms => "same_cms",
			InfraSignalType::SslSanOverlap => "ssl_san_overlap",
		}
	}
}

/// Registrar-name substring -> canonical name, verbatim from the
/// original WHOIS normalizer.
pub static REGISTRAR_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
	vec![
		(Regex::new(r"godaddy").unwrap(), "GoDaddy"),
		(Regex::new(r"namecheap").unwrap(), "Namecheap"),
		(Regex::new(r"cloudflare").unwrap(), "Cloudflare"),
		(Regex::new(r"google\s*(domains|llc)").unwrap(), "Google Domains"),
		(Regex::new(r"network\s*solutions").unwrap(), "Network Solutions"),
		(Regex::new(r"tucows").unwrap(), "Tucows"),
		(Regex::new(r"gandi").unwrap(), "Gandi"),
		(Regex::new(r"porkbun").unwrap(), "Porkbun"),
		(Regex::new(r"hostinger").unwrap(), "Hostinger"),
		(Regex::new(r"ionos|1&1").unwrap(), "IONOS"),
		(Regex::new(r"ovh").unwrap(), "OVH"),
	]
});

pub fn normalize_registrar(registrar: Option<&str>) -> Option<String> {
	let registrar = registrar?;
	let lower = registrar.to_lowercase();
	for (pattern, canonical) in REGISTRAR_PATTERNS.iter() {
		if pattern.is_match(&lower) {
			return Some(canonical.to_string());
		}
	}
	Some(registrar.to_string())
}

pub fn normalize_nameservers(nameservers: &[String]) -> Vec<String> {
	nameservers.iter().map(|ns| ns.to_lowercase().trim_end_matches('.').to_string()).collect()
}

/// ASN -> (provider, kind), verbatim from the original hosting detector.
pub static ASN_PROVIDERS: &[(&str, &str, &str)] = &[
	("AS13335", "Cloudflare", "cdn"),
	("AS16509", "Amazon AWS", "hosting"),
	("AS15169", "Google Cloud", "hosting"),
	("AS8075", "Microsoft Azure", "hosting"),
	("AS20940", "Akamai", "cdn"),
	("AS54113", "Fastly", "cdn"),
	("AS14061", "DigitalOcean", "hosting"),
	("AS63949", "Linode/Akamai", "hosting"),
	("AS20473", "Vultr", "hosting"),
	("AS26496", "GoDaddy", "hosting"),
	("AS16276", "OVH", "hosting"),
	("AS24940", "Hetzner", "hosting"),
	("AS397998", "Vercel", "hosting"),
	("AS209242", "Netlify", "hosting"),
];

pub static IP_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
	vec![
		(Regex::new(r"^104\.1[6-9]\.").unwrap(), "Cloudflare"),
		(Regex::new(r"^104\.2[0-7]\.").unwrap(), "Cloudflare"),
		(Regex::new(r"^13\.[0-9]+\.").unwrap(), "Amazon AWS"),
		(Regex::new(r"^52\.[0-9]+\.").unwrap(), "Amazon AWS"),
		(Regex::new(r"^35\.[0-9]+\.").unwrap(), "Google Cloud"),
		(Regex::new(r"^34\.[0-9]+\.").unwrap(), "Google Cloud"),
	]
});

pub static ANALYTICS_PATTERNS: Lazy<Vec<(&'static str, Vec<Regex>)>> = Lazy::new(|| {
	vec![
		("google_analytics", vec![Regex::new(r"UA-\d{4,10}-\d{1,4}").unwrap(), Regex::new(r"G-[A-Z0-9]{10,}").unwrap()]),
		("google_tag_manager", vec![Regex::new(r"GTM-[A-Z0-9]{6,}").unwrap()]),
		("facebook_pixel", vec![Regex::new(r"fbq\s*\(\s*['\x22]init['\x22]\s*,\s*['\x22](\d{15,})['\x22]").unwrap()]),
		("adsense", vec![Regex::new(r"ca-pub-\d{16}").unwrap()]),
	]
});

pub static CMS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
	vec![
		(Regex::new(r"wp-content|wp-includes").unwrap(), "WordPress"),
		(Regex::new(r"drupal\.js").unwrap(), "Drupal"),
		(Regex::new(r"Joomla!").unwrap(), "Joomla"),
		(Regex::new(r"ghost\.io").unwrap(), "Ghost"),
		(Regex::new(r"squarespace\.com").unwrap(), "Squarespace"),
		(Regex::new(r"wix\.com").unwrap(), "Wix"),
		(Regex::new(r"shopify\.com").unwrap(), "Shopify"),
		(Regex::new(r"webflow\.com").unwrap(), "Webflow"),
	]
});

pub fn detect_cms(html: &str) -> Option<&'static str> {
	for (pattern, cms) in CMS_PATTERNS.iter() {
		if pattern.is_match(html) {
			return Some(cms);
		}
	}
	None
}

#[derive(Debug, Clone, Default)]
pub struct DnsResult {
	pub a_records: Vec<String>,
	pub aaaa_records: Vec<String>,
	pub ns_records: Vec<String>,
	pub mx_records: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WhoisResult {
	pub registrar: Option<String>,
	pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HostingResult {
	pub ip_address: String,
	pub asn: Option<String>,
	pub hosting_provider: Option<String>,
	pub cdn_provider: Option<String>,
	pub is_shared_hosting: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsResult {
	pub google_analytics_ids: Vec<String>,
	pub google_tag_manager_ids: Vec<String>,
	pub facebook_pixel_ids: Vec<String>,
	pub adsense_ids: Vec<String>,
	pub cms_detected: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SslResult {
	pub issuer: Option<String>,
	pub subject_alt_names: Vec<String>,
	pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InfrastructureProfile {
	pub domain: String,
	pub dns: Option<DnsResult>,
	pub whois: Option<WhoisResult>,
	pub hosting: Vec<HostingResult>,
	pub analytics: Option<AnalyticsResult>,
	pub ssl: Option<SslResult>,
}

/// `sha256(issuer + sorted(SANs))[:16]`, verbatim from the original SSL
/// analyzer's fingerprint derivation.
pub fn ssl_fingerprint(issuer: &str, sans: &[String]) -> String {
	let mut sorted_sans = sans.to_vec();
	sorted_sans.sort();
	let mut hasher = Sha256::new();
	hasher.update(issuer.as_bytes());
	for san in &sorted_sans {
		hasher.update(san.as_bytes());
	}
	let digest = hasher.finalize();
	hex::encode(digest)[..16].to_string()
}

#[derive(Debug, Clone)]
pub struct SharedInfrastructureMatch {
	pub domain_a: String,
	pub domain_b: String,
	pub signals: Vec<InfraSignal>,
	pub total_score: f64,
}

impl SharedInfrastructureMatch {
	fn new(domain_a: &str, domain_b: &str) -> Self {
		SharedInfrastructureMatch { domain_a: domain_a.to_string(), domain_b: domain_b.to_string(), signals: Vec::new(), total_score: 0.0 }
	}

	fn add_signal(&mut self, signal_type: InfraSignalType, value: &str) {
		let weight = signal_type.weight();
		self.signals.push(InfraSignal { signal_type: signal_type.as_str().to_string(), value: value.to_string(), weight });
		self.total_score += weight;
	}

	pub fn confidence(&self) -> f64 {
		(self.total_score / 10.0).min(1.0)
	}

	/// SHARED_INFRA's `sharing_category` property, per the fixed priority
	/// order in `create_shared_infra_relationships` (spec.md §4.6):
	/// analytics > hosting > certificate > generic infrastructure.
	pub fn sharing_category(&self) -> Option<String> {
		if self.signals.is_empty() {
			None
		} else {
			Some(sharing_category(&self.signals))
		}
	}
}

pub struct InfrastructureScorer;

impl InfrastructureScorer {
	pub fn compare(a: &InfrastructureProfile, b: &InfrastructureProfile) -> SharedInfrastructureMatch {
		let mut m = SharedInfrastructureMatch::new(&a.domain, &b.domain);

		if let (Some(wa), Some(wb)) = (&a.whois, &b.whois) {
			Self::compare_whois(wa, wb, &mut m);
		}
		if let (Some(da), Some(db)) = (&a.dns, &b.dns) {
			Self::compare_dns(da, db, &mut m);
		}
		if !a.hosting.is_empty() && !b.hosting.is_empty() {
			Self::compare_hosting(&a.hosting, &b.hosting, &mut m);
		}
		if let (Some(aa), Some(ab)) = (&a.analytics, &b.analytics) {
			Self::compare_analytics(aa, ab, &mut m);
		}
		if let (Some(sa), Some(sb)) = (&a.ssl, &b.ssl) {
			Self::compare_ssl(&a.domain, &b.domain, sa, sb, &mut m);
		}

		m
	}

	fn compare_whois(a: &WhoisResult, b: &WhoisResult, m: &mut SharedInfrastructureMatch) {
		if let (Some(ra), Some(rb)) = (&a.registrar, &b.registrar) {
			if ra == rb {
				m.add_signal(InfraSignalType::SameRegistrar, ra);
			}
		}
		let set_a: HashSet<_> = a.nameservers.iter().collect();
		for ns in &b.nameservers {
			if set_a.contains(ns) {
				m.add_signal(InfraSignalType::SameNameserver, ns);
			}
		}
	}

	fn compare_dns(a: &DnsResult, b: &DnsResult, m: &mut SharedInfrastructureMatch) {
		let set_a: HashSet<_> = a.a_records.iter().collect();
		for ip in &b.a_records {
			if set_a.contains(ip) {
				m.add_signal(InfraSignalType::SameIp, ip);
			}
		}
	}

	fn compare_hosting(a: &[HostingResult], b: &[HostingResult], m: &mut SharedInfrastructureMatch) {
		let asns_a: HashSet<_> = a.iter().filter_map(|h| h.asn.as_deref()).collect();
		let asns_b: HashSet<_> = b.iter().filter_map(|h| h.asn.as_deref()).collect();
		for asn in asns_a.intersection(&asns_b) {
			m.add_signal(InfraSignalType::SameAsn, asn);
		}

		let hosts_a: HashSet<_> = a.iter().filter(|h| !h.is_shared_hosting).filter_map(|h| h.hosting_provider.as_deref()).collect();
		let hosts_b: HashSet<_> = b.iter().filter(|h| !h.is_shared_hosting).filter_map(|h| h.hosting_provider.as_deref()).collect();
		for host in hosts_a.intersection(&hosts_b) {
			m.add_signal(InfraSignalType::SameHosting, host);
		}
	}

	fn compare_analytics(a: &AnalyticsResult, b: &AnalyticsResult, m: &mut SharedInfrastructureMatch) {
		let ga_a: HashSet<_> = a.google_analytics_ids.iter().collect();
		for id in &b.google_analytics_ids {
			if ga_a.contains(id) {
				m.add_signal(InfraSignalType::SameAnalytics, id);
			}
		}
		let gtm_a: HashSet<_> = a.google_tag_manager_ids.iter().collect();
		for id in &b.google_tag_manager_ids {
			if gtm_a.contains(id) {
				m.add_signal(InfraSignalType::SameGtm, id);
			}
		}
		let pixel_a: HashSet<_> = a.facebook_pixel_ids.iter().collect();
		for id in &b.facebook_pixel_ids {
			if pixel_a.contains(id) {
				m.add_signal(InfraSignalType::SamePixel, id);
			}
		}
		let adsense_a: HashSet<_> = a.adsense_ids.iter().collect();
		for id in &b.adsense_ids {
			if adsense_a.contains(id) {
				m.add_signal(InfraSignalType::SameAdsense, id);
			}
		}
		if let (Some(ca), Some(cb)) = (&a.cms_detected, &b.cms_detected) {
			if ca == cb {
				m.add_signal(InfraSignalType::SameCms, ca);
			}
		}
	}

	fn compare_ssl(domain_a: &str, domain_b: &str, a: &SslResult, b: &SslResult, m: &mut SharedInfrastructureMatch) {
		if let (Some(ia), Some(ib)) = (&a.issuer, &b.issuer) {
			if ia == ib {
				m.add_signal(InfraSignalType::SameSslIssuer, ia);
			}
		}
		let excluded: HashSet<String> = [domain_a.to_string(), domain_b.to_string(), format!("*.{}", domain_a), format!("*.{}", domain_b)].into_iter().collect();
		let set_a: HashSet<_> = a.subject_alt_names.iter().collect();
		for san in &b.subject_alt_names {
			if set_a.contains(san) && !excluded.contains(san) {
				m.add_signal(InfraSignalType::SslSanOverlap, san);
			}
		}
	}
}

pub const DEFAULT_MIN_SCORE: f64 = 1.0;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

pub struct InfrastructureDetector {
	resolver: trust_dns_resolver::TokioAsyncResolver,
	http: reqwest::Client,
}

impl InfrastructureDetector {
	pub fn new() -> Result<Self> {
		let resolver = trust_dns_resolver::TokioAsyncResolver::tokio(
			trust_dns_resolver::config::ResolverConfig::default(),
			trust_dns_resolver::config::ResolverOpts::default(),
		)?;
		let http = reqwest::Client::builder().user_agent("Mozilla/5.0 (compatible; MITDS/1.0)").build().map_err(crate::error::MitdsError::Http)?;
		Ok(InfrastructureDetector { resolver, http })
	}

	pub async fn resolve_dns(&self, domain: &str) -> DnsResult {
		let mut result = DnsResult::default();
		if let Ok(lookup) = self.resolver.ipv4_lookup(domain).await {
			result.a_records = lookup.iter().map(|ip| ip.to_string()).collect();
		}
		if let Ok(lookup) = self.resolver.ipv6_lookup(domain).await {
			result.aaaa_records = lookup.iter().map(|ip: &std::net::Ipv6Addr| ip.to_string()).collect();
		}
		if let Ok(lookup) = self.resolver.ns_lookup(domain).await {
			result.ns_records = lookup.iter().map(|ns| ns.to_string().trim_end_matches('.').to_lowercase()).collect();
		}
		if let Ok(lookup) = self.resolver.mx_lookup(domain).await {
			result.mx_records = lookup.iter().map(|mx| mx.exchange().to_string().trim_end_matches('.').to_lowercase()).collect();
		}
		result
	}

	pub fn asn_provider(asn: &str) -> Option<(&'static str, &'static str)> {
		ASN_PROVIDERS.iter().find(|(code, _, _)| *code == asn).map(|(_, name, kind)| (*name, *kind))
	}

	pub fn ip_provider(ip: &IpAddr) -> Option<&'static str> {
		let s = ip.to_string();
		IP_PATTERNS.iter().find(|(pattern, _)| pattern.is_match(&s)).map(|(_, provider)| *provider)
	}

	pub async fn find_shared_infrastructure(&self, profiles: &[InfrastructureProfile], min_score: f64) -> Vec<SharedInfrastructureMatch> {
		let mut matches = Vec::new();
		for i in 0..profiles.len() {
			for j in (i + 1)..profiles.len() {
				let m = InfrastructureScorer::compare(&profiles[i], &profiles[j]);
				if m.total_score >= min_score {
					matches.push(m);
				}
			}
		}
		matches.sort_by(|a, b| b.total_score.partial_cmp(&a.total_score).unwrap());
		matches
	}
}

/// Free function used by [`crate::graph::GraphWriter::create_shared_infra`]
/// to populate the SHARED_INFRA edge's `sharing_category` property.
/// Priority order from `create_shared_infra_relationships`: analytics
/// (same_analytics/same_gtm/same_adsense) > hosting (same_ip) >
/// certificate (ssl_san_overlap) > generic infrastructure, verbatim from
/// `original_source/.../detection/infra.py`.
pub fn sharing_category(signals: &[InfraSignal]) -> String {
	let types: HashSet<&str> = signals.iter().map(|s| s.signal_type.as_str()).collect();
	if types.contains("same_analytics") || types.contains("same_gtm") || types.contains("same_adsense") {
		"analytics".to_string()
	} else if types.contains("same_ip") {
		"hosting".to_string()
	} else if types.contains("ssl_san_overlap") {
		"certificate".to_string()
	} else {
		"infrastructure".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn godaddy_registrar_variants_normalize() {
		assert_eq!(normalize_registrar(Some("GoDaddy.com, LLC")), Some("GoDaddy".to_string()));
	}

	#[test]
	fn unmatched_registrar_passes_through() {
		assert_eq!(normalize_registrar(Some("Some Obscure Registrar Inc")), Some("Some Obscure Registrar Inc".to_string()));
	}

	#[test]
	fn nameservers_are_lowercased_and_trailing_dot_stripped() {
		assert_eq!(normalize_nameservers(&["NS1.EXAMPLE.COM.".to_string()]), vec!["ns1.example.com".to_string()]);
	}

	#[test]
	fn cloudflare_asn_is_cdn() {
		assert_eq!(InfrastructureDetector::asn_provider("AS13335"), Some(("Cloudflare", "cdn")));
	}

	#[test]
	fn aws_asn_is_hosting() {
		assert_eq!(InfrastructureDetector::asn_provider("AS16509"), Some(("Amazon AWS", "hosting")));
	}

	#[test]
	fn wordpress_cms_pattern_matches() {
		assert_eq!(detect_cms("<link href=\"/wp-content/themes/foo/style.css\">"), Some("WordPress"));
	}

	#[test]
	fn matching_registrar_and_nameservers_score_above_min() {
		let mut a = InfrastructureProfile { domain: "a.example".to_string(), ..Default::default() };
		let mut b = InfrastructureProfile { domain: "b.example".to_string(), ..Default::default() };
		a.whois = Some(WhoisResult { registrar: Some("GoDaddy".to_string()), nameservers: vec!["ns1.example.com".to_string()] });
		b.whois = Some(WhoisResult { registrar: Some("GoDaddy".to_string()), nameservers: vec!["ns1.example.com".to_string()] });

		let m = InfrastructureScorer::compare(&a, &b);
		assert!(m.total_score >= DEFAULT_MIN_SCORE);
		assert_eq!(m.signals.len(), 2);
	}

	#[test]
	fn ssl_san_overlap_excludes_the_two_domains_themselves() {
		let a = SslResult { issuer: None, subject_alt_names: vec!["a.example".to_string(), "shared.example".to_string()], fingerprint: None };
		let b = SslResult { issuer: None, subject_alt_names: vec!["b.example".to_string(), "shared.example".to_string()], fingerprint: None };
		let mut m = SharedInfrastructureMatch::new("a.example", "b.example");
		InfrastructureScorer::compare_ssl("a.example", "b.example", &a, &b, &mut m);
		assert_eq!(m.signals.len(), 1);
		assert_eq!(m.signals[0].value, "shared.example");
	}

	#[test]
	fn ssl_fingerprint_is_deterministic() {
		let f1 = ssl_fingerprint("CN=Example CA", &["a.example".to_string(), "b.example".to_string()]);
		let f2 = ssl_fingerprint("CN=Example CA", &["b.example".to_string(), "a.example".to_string()]);
		assert_eq!(f1, f2);
		assert_eq!(f1.len(), 16);
	}

	#[test]
	fn sharing_category_prefers_analytics_over_other_signals() {
		let signals = vec![
			InfraSignal { signal_type: "same_registrar".to_string(), value: "GoDaddy".to_string(), weight: 0.5 },
			InfraSignal { signal_type: "same_ip".to_string(), value: "1.2.3.4".to_string(), weight: 3.0 },
			InfraSignal { signal_type: "same_analytics".to_string(), value: "G-XXXX".to_string(), weight: 4.0 },
		];
		assert_eq!(sharing_category(&signals), "analytics");
	}

	#[test]
	fn sharing_category_falls_back_to_hosting_then_certificate_then_infrastructure() {
		let ip_only = vec![InfraSignal { signal_type: "same_ip".to_string(), value: "1.2.3.4".to_string(), weight: 3.0 }];
		assert_eq!(sharing_category(&ip_only), "hosting");

		let ssl_only = vec![InfraSignal { signal_type: "ssl_san_overlap".to_string(), value: "shared.example".to_string(), weight: 4.0 }];
		assert_eq!(sharing_category(&ssl_only), "certificate");

		let registrar_only = vec![InfraSignal { signal_type: "same_registrar".to_string(), value: "GoDaddy".to_string(), weight: 0.5 }];
		assert_eq!(sharing_category(&registrar_only), "infrastructure");
	}
}
