use {
    anyhow::Result,
    supportdesk_agents::{EscalationGate, providers::build_classifier},
    supportdesk_config::SupportdeskConfig,
    supportdesk_knowledge::{
        KnowledgeBase,
        tools::{render_search_results, render_topic, render_topic_list},
    },
};

pub async fn search(
    config: &SupportdeskConfig,
    query: &str,
    k: usize,
    min_score: Option<f32>,
) -> Result<()> {
    let kb = KnowledgeBase::load(&config.knowledge)?;
    let min_score = min_score.unwrap_or(config.knowledge.min_similarity);
    let hits = kb.search(query, k, min_score).await?;
    println!("{}", render_search_results(query, &hits));
    Ok(())
}

pub fn topics(config: &SupportdeskConfig, category: Option<&str>) -> Result<()> {
    let kb = KnowledgeBase::load(&config.knowledge)?;
    let topics = kb.list_topics(category);
    println!("{}", render_topic_list(category, &topics));
    Ok(())
}

pub async fn topic(config: &SupportdeskConfig, name: &str) -> Result<()> {
    let kb = KnowledgeBase::load(&config.knowledge)?;
    let lookup = kb.get_by_topic(name).await?;
    println!("{}", render_topic(name, &lookup));
    Ok(())
}

pub async fn classify(config: &SupportdeskConfig, message: &str) -> Result<()> {
    let gate = EscalationGate::new(build_classifier(&config.models));
    let decision = gate.classify(message).await;
    let out = serde_json::json!({
        "classifier": gate.classifier_id(),
        "requested": decision.requested,
        "reason": decision.reason,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
