//! SEC EDGAR adapter (spec.md §4.4, SPEC_FULL.md §4.4).
//!
//! Grounded on `original_source/.../ingestion/edgar.py`: the
//! `CANADIAN_JURISDICTIONS` code table and `is_canadian_jurisdiction`
//! function are reproduced verbatim (spec.md §6's "must reproduce
//! verbatim" fixed-table requirement, tested by scenario S2). The
//! Schedule 13D/13G index-page parse and Form 4 ownership-document parse
//! below port `edgar.py`'s two largest record-extraction paths: beyond
//! registering an issuer, they recover OWNS edges (subject vs. filer)
//! and DIRECTOR_OF/EMPLOYED_BY edges (reporting owner to issuer).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use super::{IngestionConfig, Ingester, ProcessOutcome, ProcessResult};
use crate::error::Result;
use crate::graph::GraphWriter;
use crate::resolver::Mention;
use crate::types::{DirectorOfAttrs, EdgeType, EntityType, Evidence, OwnsAttrs};

pub const EDGAR_BASE_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar";
pub const EDGAR_SUBMISSIONS_URL: &str = "https://data.sec.gov/submissions";
pub const EDGAR_COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
pub const EDGAR_ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";
pub const USER_AGENT: &str = "MITDS research contact@example.org";

/// Hard cap on per-CIK filings walked for 13D/13G/Form-4 detail in a
/// single `process_record` call, to bound worst-case request fan-out.
const MAX_FILINGS_PER_RECORD: usize = 50;

/// Canadian jurisdiction codes used by SEC EDGAR's `stateOfIncorporation`
/// field. Reproduced verbatim: `"CA"` is explicitly California, not
/// Canada — see scenario S2.
pub const CANADIAN_JURISDICTIONS: &[(&str, &str)] = &[
	("A0", "Alberta"),
	("A1", "British Columbia"),
	("A2", "Manitoba"),
	("A3", "New Brunswick"),
	("A4", "Newfoundland"),
	("A5", "Nova Scotia"),
	("A6", "Ontario"),
	("A7", "Prince Edward Island"),
	("A8", "Quebec"),
	("A9", "Saskatchewan"),
	("B0", "Yukon"),
	("B1", "Northwest Territories"),
	("B2", "Nunavut"),
	("CANADA", "Canada"),
];

pub fn is_canadian_jurisdiction(state_of_incorporation: &str) -> bool {
	let code = state_of_incorporation.trim().to_uppercase();
	CANADIAN_JURISDICTIONS.iter().any(|(k, _)| *k == code)
}

/// A Form 4 `ownershipDocument`'s fields relevant to DIRECTOR_OF /
/// EMPLOYED_BY extraction. Deserialized directly off the XML via
/// `quick_xml::de`, mirroring `edgar.py`'s `lxml` field lookups.
#[derive(Debug, Deserialize)]
struct OwnershipDocument {
	issuer: Issuer,
	#[serde(rename = "reportingOwner")]
	reporting_owner: ReportingOwner,
}

#[derive(Debug, Deserialize)]
struct Issuer {
	#[serde(rename = "issuerCik")]
	issuer_cik: String,
	#[serde(rename = "issuerName")]
	issuer_name: String,
}

#[derive(Debug, Deserialize)]
struct ReportingOwner {
	#[serde(rename = "reportingOwnerId")]
	id: ReportingOwnerId,
	#[serde(rename = "reportingOwnerRelationship")]
	relationship: ReportingOwnerRelationship,
}

#[derive(Debug, Deserialize)]
struct ReportingOwnerId {
	#[serde(rename = "rptOwnerCik")]
	cik: String,
	#[serde(rename = "rptOwnerName")]
	name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReportingOwnerRelationship {
	#[serde(rename = "isDirector", default)]
	is_director: String,
	#[serde(rename = "isOfficer", default)]
	is_officer: String,
	#[serde(rename = "officerTitle", default)]
	officer_title: String,
}

fn xml_bool(s: &str) -> bool {
	matches!(s.trim(), "1" | "true")
}

/// Extracts the "Subject Company" and "Filed by" party (CIK, name) from
/// a Schedule 13D/13G filing's index page. EDGAR's index HTML lists
/// both parties as `CIK=NNNNNNNNNN` links with the company name as the
/// anchor text, subject first, filer second.
fn parse_13d_index(html: &str) -> Option<((String, String), (String, String))> {
	let subject_pos = html.find("Subject Company")?;
	let filer_pos = html.find("Filed by")?;
	let subject = find_cik_after(html, subject_pos)?;
	let filer = find_cik_after(html, filer_pos)?;
	Some((subject, filer))
}

fn find_cik_after(html: &str, pos: usize) -> Option<(String, String)> {
	let slice = &html[pos..];
	let re = regex::Regex::new(r"CIK=(\d{10})[^>]*>([^<]+)<").ok()?;
	re.captures(slice).map(|c| (c[1].to_string(), c[2].trim().to_string()))
}

pub struct EdgarIngester {
	client: Client,
	pool: sqlx::PgPool,
	provenance: Option<std::sync::Arc<crate::provenance::ProvenanceStore>>,
}

impl EdgarIngester {
	pub fn new(pool: sqlx::PgPool) -> Self {
		EdgarIngester { client: Client::builder().user_agent(USER_AGENT).build().expect("client config is static"), pool, provenance: None }
	}

	pub fn with_provenance(pool: sqlx::PgPool, provenance: std::sync::Arc<crate::provenance::ProvenanceStore>) -> Self {
		EdgarIngester { client: Client::builder().user_agent(USER_AGENT).build().expect("client config is static"), pool, provenance: Some(provenance) }
	}

	/// Builds an evidence row for `data`, uploading it through the
	/// configured provenance store when one is present; otherwise the
	/// content hash and storage key are still computed and recorded so
	/// the evidence row is consistent once a store is wired in.
	async fn evidence_for(&self, evidence_type: &str, source_url: &str, identifier: &str, extension: &str, content_type: &str, data: &[u8]) -> Result<Evidence> {
		let (raw_data_key, content_hash) = match &self.provenance {
			Some(store) => store.put("edgar", identifier, extension, data, content_type).await?,
			None => (crate::provenance::storage_key("edgar", identifier, extension, None), crate::provenance::content_hash(data)),
		};
		Ok(Evidence {
			id: Uuid::new_v4(),
			evidence_type: evidence_type.to_string(),
			source_url: Some(source_url.to_string()),
			retrieved_at: Utc::now(),
			extractor_name: "edgar".to_string(),
			extractor_version: "1".to_string(),
			raw_data_key,
			content_hash,
			extraction_confidence: 1.0,
		})
	}

	/// Registers an issuer/filer by SEC CIK, routed through the resolver
	/// so a fuzzy name match against an entity already known under a
	/// different identifier (e.g. via OpenCorporates) can auto-merge.
	async fn upsert_filer_tx(&self, tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, writer: &GraphWriter, cik: &str, name: &str, jurisdiction: Option<&str>) -> Result<Uuid> {
		let external_ids = serde_json::json!({"sec_cik": cik});
		let mention = Mention { name: name.to_string(), jurisdiction: jurisdiction.map(str::to_string), ..Default::default() };
		let result = writer.resolve_and_upsert_node_tx(tx, EntityType::Organization, &mention, &external_ids, &serde_json::json!({}), &serde_json::json!({})).await?;
		Ok(result.id)
	}

	/// Fetches a Schedule 13D/13G's index page and, if it lists both a
	/// subject company and a filer, writes the OWNS edge between them
	/// (filer owns/reports on subject) with the filing's evidence.
	async fn process_13d(&self, writer: &GraphWriter, accession: &str, form: &str, filing_date: Option<DateTime<Utc>>) -> Result<()> {
		let accession_nodash = accession.replace('-', "");
		let index_url = format!("{}/{}/{}-index.htm", EDGAR_ARCHIVES_URL, accession_nodash, accession);
		let html = self.client.get(&index_url).send().await?.text().await?;

		let Some(((subject_cik, subject_name), (filer_cik, filer_name))) = parse_13d_index(&html) else {
			return Ok(());
		};

		let mut tx = writer.begin().await?;
		let subject_id = self.upsert_filer_tx(&mut tx, writer, &subject_cik, &subject_name, None).await?;
		let filer_id = self.upsert_filer_tx(&mut tx, writer, &filer_cik, &filer_name, None).await?;

		let evidence = self.evidence_for("sec_13d_13g_index", &index_url, accession, "html", "text/html", html.as_bytes()).await?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;

		let attrs = OwnsAttrs { ownership_percentage: None, share_class: None, filing_accession: Some(accession.to_string()), form_type: Some(form.to_string()), filing_date };
		let merge_key = format!("{}:{}:{}", filer_id, subject_id, accession);
		writer.upsert_edge_tx(&mut tx, EdgeType::Owns, filer_id, subject_id, &merge_key, &serde_json::to_value(&attrs)?, &[evidence_id]).await?;

		tx.commit().await?;
		Ok(())
	}

	/// Fetches a Form 4 ownership document and writes DIRECTOR_OF and/or
	/// EMPLOYED_BY from the reporting owner to the issuer.
	async fn process_form4(&self, writer: &GraphWriter, accession: &str, primary_document: &str) -> Result<()> {
		if primary_document.is_empty() {
			return Ok(());
		}
		let accession_nodash = accession.replace('-', "");
		let doc_url = format!("{}/{}/{}", EDGAR_ARCHIVES_URL, accession_nodash, primary_document);
		let xml = self.client.get(&doc_url).send().await?.text().await?;

		let doc: OwnershipDocument = match quick_xml::de::from_str(&xml) {
			Ok(doc) => doc,
			Err(_) => return Ok(()), // not every "4" primary document is parseable XML (paper filings, amendments)
		};

		let is_director = xml_bool(&doc.reporting_owner.relationship.is_director);
		let is_officer = xml_bool(&doc.reporting_owner.relationship.is_officer);
		if !is_director && !is_officer {
			return Ok(());
		}

		let mut tx = writer.begin().await?;
		let issuer_id = self.upsert_filer_tx(&mut tx, writer, &doc.issuer.issuer_cik, &doc.issuer.issuer_name, None).await?;

		let owner_external_ids = serde_json::json!({"sec_cik": doc.reporting_owner.id.cik});
		let owner_mention = Mention { name: doc.reporting_owner.id.name.clone(), ..Default::default() };
		let owner = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Person, &owner_mention, &owner_external_ids, &serde_json::json!({}), &serde_json::json!({})).await?;

		let evidence = self.evidence_for("sec_form4", &doc_url, accession, "xml", "application/xml", xml.as_bytes()).await?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;

		let title = doc.reporting_owner.relationship.officer_title.clone();
		let attrs = DirectorOfAttrs { title: title.clone(), compensation: None, hours_per_week: None };
		let attrs_json = serde_json::to_value(&attrs)?;

		if is_director {
			let merge_key = format!("{}:{}:{}", owner.id, issuer_id, EdgeType::DirectorOf.as_str());
			writer.upsert_edge_tx(&mut tx, EdgeType::DirectorOf, owner.id, issuer_id, &merge_key, &attrs_json, &[evidence_id]).await?;
		}
		if is_officer {
			let merge_key = format!("{}:{}:{}", owner.id, issuer_id, EdgeType::EmployedBy.as_str());
			writer.upsert_edge_tx(&mut tx, EdgeType::EmployedBy, owner.id, issuer_id, &merge_key, &attrs_json, &[evidence_id]).await?;
		}

		tx.commit().await?;
		Ok(())
	}
}

#[async_trait]
impl Ingester for EdgarIngester {
	fn source_name(&self) -> &'static str {
		"edgar"
	}

	fn fetch_records<'a>(&'a self, config: &'a IngestionConfig) -> BoxStream<'a, Result<serde_json::Value>> {
		let target_ciks = config.target_entities.clone().unwrap_or_default();
		stream::iter(target_ciks.into_iter().map(|cik| Ok(serde_json::json!({"cik": cik})))).boxed()
	}

	async fn process_record(&self, record: serde_json::Value) -> Result<ProcessResult> {
		let cik = record["cik"].as_str().unwrap_or_default().to_string();
		let url = format!("{}/CIK{:0>10}.json", EDGAR_SUBMISSIONS_URL, cik);
		let body = self.client.get(&url).send().await?.bytes().await?;
		let submissions: serde_json::Value = serde_json::from_slice(&body)?;

		let state_of_incorporation = submissions["stateOfIncorporation"].as_str().unwrap_or_default();
		let is_canadian = is_canadian_jurisdiction(state_of_incorporation);
		let jurisdiction = if is_canadian { "CA".to_string() } else { state_of_incorporation.to_string() };

		let external_ids = serde_json::json!({"sec_cik": cik});
		let name = submissions["name"].as_str().unwrap_or(&cik).to_string();
		let properties = serde_json::json!({
			"org_type": "corporation",
			"jurisdiction": jurisdiction,
			"is_canadian": is_canadian,
		});

		let writer = GraphWriter::new(self.pool.clone());
		let mention = Mention { name: name.clone(), jurisdiction: Some(jurisdiction.clone()), ..Default::default() };

		let mut tx = writer.begin().await?;
		let org = writer.resolve_and_upsert_node_tx(&mut tx, EntityType::Organization, &mention, &external_ids, &serde_json::json!({}), &properties).await?;
		let evidence = self.evidence_for("sec_submissions", &url, &cik, "json", "application/json", &body).await?;
		let evidence_id = writer.record_evidence_tx(&mut tx, &evidence).await?;
		writer.link_evidence_to_node_tx(&mut tx, org.id, evidence_id).await?;
		tx.commit().await?;

		let forms = submissions["filings"]["recent"]["form"].as_array().cloned().unwrap_or_default();
		let accessions = submissions["filings"]["recent"]["accessionNumber"].as_array().cloned().unwrap_or_default();
		let dates = submissions["filings"]["recent"]["filingDate"].as_array().cloned().unwrap_or_default();
		let primary_docs = submissions["filings"]["recent"]["primaryDocument"].as_array().cloned().unwrap_or_default();

		for i in 0..forms.len().min(MAX_FILINGS_PER_RECORD) {
			let form = forms[i].as_str().unwrap_or_default();
			let accession = accessions.get(i).and_then(|v| v.as_str()).unwrap_or_default();
			if accession.is_empty() {
				continue;
			}
			let filing_date = dates.get(i).and_then(|v| v.as_str()).and_then(|d| format!("{}T00:00:00Z", d).parse::<DateTime<Utc>>().ok());

			if form.starts_with("SC 13D") || form.starts_with("SC 13G") {
				self.process_13d(&writer, accession, form, filing_date).await?;
			} else if form == "4" {
				let primary_document = primary_docs.get(i).and_then(|v| v.as_str()).unwrap_or_default();
				self.process_form4(&writer, accession, primary_document).await?;
			}
		}

		Ok(ProcessResult {
			outcome: if org.created { ProcessOutcome::Created } else { ProcessOutcome::Updated },
			entity_id: Some(org.id),
			record_label: name,
		})
	}

	async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
		Ok(None)
	}

	async fn save_sync_time(&self, _timestamp: DateTime<Utc>) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ontario_code_a6_is_canadian() {
		assert!(is_canadian_jurisdiction("A6"));
	}

	#[test]
	fn literal_canada_is_canadian() {
		assert!(is_canadian_jurisdiction("CANADA"));
	}

	#[test]
	fn ca_is_california_not_canada() {
		// Scenario S2: the two-letter code "CA" is California.
		assert!(!is_canadian_jurisdiction("CA"));
	}

	#[test]
	fn unrelated_code_is_not_canadian() {
		assert!(!is_canadian_jurisdiction("NY"));
	}

	#[test]
	fn parses_subject_and_filer_ciks_from_index_page() {
		let html = r#"
			<h2>Subject Company</h2>
			<a href="/cgi-bin/browse-edgar?action=getcompany&CIK=0000123456">ACME CORP</a>
			<h2>Filed by</h2>
			<a href="/cgi-bin/browse-edgar?action=getcompany&CIK=0000987654">INVESTOR LLC</a>
		"#;
		let ((subject_cik, subject_name), (filer_cik, filer_name)) = parse_13d_index(html).unwrap();
		assert_eq!(subject_cik, "0000123456");
		assert_eq!(subject_name, "ACME CORP");
		assert_eq!(filer_cik, "0000987654");
		assert_eq!(filer_name, "INVESTOR LLC");
	}

	#[test]
	fn missing_sections_yield_no_parse() {
		assert!(parse_13d_index("<html>nothing here</html>").is_none());
	}

	#[test]
	fn xml_bool_accepts_one_and_true() {
		assert!(xml_bool("1"));
		assert!(xml_bool("true"));
		assert!(!xml_bool("0"));
		assert!(!xml_bool(""));
	}
}
