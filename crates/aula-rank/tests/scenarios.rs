use std::collections::HashMap;

use aula_config::{AulaConfig, CalibrationStrategy, PopularityTuning, RelatedCoursesConfig};
use aula_core::{
    AggregatedQuery, Catalog, CatalogItem, EntityKind, INSUFFICIENT_DATA_REASON, ScoringMode,
    Topic,
};
use aula_infer::{LoadedEmbeddingProvider, MockEmbeddingProvider, SemanticIndex};
use aula_rank::{
    ContextHint, PopularityScorer, RankingService, RelatedCourseRecommender, SemanticView,
};

fn course_scorer() -> PopularityScorer {
    PopularityScorer::new(
        EntityKind::Course,
        PopularityTuning::course(),
        CalibrationStrategy::Blended,
    )
}

fn mock_provider() -> LoadedEmbeddingProvider {
    LoadedEmbeddingProvider {
        provider: Box::new(MockEmbeddingProvider),
        provider_name: "mock".to_owned(),
        model_name: "mock-64d".to_owned(),
    }
}

fn networking_catalog() -> Catalog {
    Catalog::new(
        vec![
            CatalogItem::new(101, "Redes I").with_topics(&["Redes"]),
            CatalogItem::new(102, "Redes II").with_topics(&["Redes"]),
            CatalogItem::new(103, "Redes Avanzadas").with_topics(&["Redes"]),
            CatalogItem::new(104, "Bases de Datos").with_topics(&["Bases de Datos"]),
            CatalogItem::new(105, "Sistemas Distribuidos").with_topics(&["Concurrencia"]),
            CatalogItem::new(106, "Compiladores").with_topics(&["Autómatas"]),
        ],
        vec![Topic::new(1, "Redes"), Topic::new(2, "Bases de Datos")],
    )
}

#[test]
fn scenario_a_exact_title_wins_with_high_confidence() {
    let catalog = Catalog::new(
        vec![
            CatalogItem::new(1, "Cálculo I"),
            CatalogItem::new(2, "Álgebra Lineal"),
            CatalogItem::new(3, "Física General"),
        ],
        Vec::new(),
    );
    let trends = vec![AggregatedQuery::with_weight("algebra lineal", 70, 70.0)];

    let result = course_scorer()
        .predict(&catalog, &trends, None)
        .expect("predict");

    assert_eq!(result.predicted_name.as_deref(), Some("Álgebra Lineal"));
    assert_eq!(result.predicted_id, Some(2));
    assert!(result.confidence > 0.5);
    assert!(result.confidence < 1.0);
}

#[test]
fn scenario_b_lexical_match_beats_semantic_neighbour() {
    let catalog = Catalog::new(
        vec![
            CatalogItem::new(1, "Cálculo I"),
            CatalogItem::new(2, "Derivadas"),
        ],
        Vec::new(),
    );
    // "calculo" sits closer to "Derivadas" than to "Cálculo I" in vector space.
    let index = SemanticIndex::new(vec![1, 2], vec![vec![0.3, 0.954], vec![0.8, 0.6]])
        .expect("index");
    let vectors = HashMap::from([
        ("calculo".to_owned(), vec![1.0, 0.0]),
        ("razon de cambio".to_owned(), vec![0.8, 0.6]),
    ]);
    let view = SemanticView::new(&index, &vectors);

    let trends = vec![AggregatedQuery::with_weight("calculo", 80, 80.0)];
    let hybrid = course_scorer()
        .predict(&catalog, &trends, Some(&view))
        .expect("hybrid predict");
    let lexical = course_scorer()
        .predict(&catalog, &trends, None)
        .expect("lexical predict");

    assert_eq!(hybrid.predicted_name.as_deref(), Some("Cálculo I"));
    assert_eq!(hybrid.mode_used, ScoringMode::Hybrid);
    assert_eq!(hybrid.confidence, lexical.confidence);

    // Similarity 1.0 with zero shared stems: vetoed down to half impact, never full credit.
    let adjacent = vec![AggregatedQuery::with_weight("razon de cambio", 80, 80.0)];
    let vetoed = course_scorer()
        .predict(&catalog, &adjacent, Some(&view))
        .expect("vetoed predict");
    assert_eq!(vetoed.predicted_id, Some(2));
    assert!(vetoed.reason.contains("popularity score 40.0"));
}

#[test]
fn scenario_b_moderate_similarity_without_overlap_scores_zero() {
    let catalog = Catalog::new(
        vec![
            CatalogItem::new(1, "Cálculo I"),
            CatalogItem::new(2, "Derivadas"),
        ],
        Vec::new(),
    );
    let index =
        SemanticIndex::new(vec![1, 2], vec![vec![0.0, 1.0], vec![1.0, 0.0]]).expect("index");
    let vectors = HashMap::from([("pendiente de la tangente".to_owned(), vec![0.8, 0.6])]);
    let view = SemanticView::new(&index, &vectors);

    let trends = vec![AggregatedQuery::with_weight(
        "pendiente de la tangente",
        80,
        80.0,
    )];
    let result = course_scorer()
        .predict(&catalog, &trends, Some(&view))
        .expect("predict");

    assert!(result.is_null());
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn scenario_c_shared_topic_is_recommended_and_direct_results_excluded() {
    let config = RelatedCoursesConfig::default();
    let result = RelatedCourseRecommender::new(&config)
        .recommend(
            "redes",
            &[101, 102],
            &networking_catalog(),
            None,
            &ContextHint::default(),
        )
        .expect("recommend");

    let ids = result.ids();
    assert_eq!(ids.first(), Some(&103));
    assert!(!ids.contains(&101));
    assert!(!ids.contains(&102));
    if let Some(position) = ids.iter().position(|id| *id == 104) {
        assert!(position > 0);
    }
}

#[tokio::test]
async fn scenario_c_through_the_service_with_embeddings() {
    let service = RankingService::new(AulaConfig::default(), Some(mock_provider()));
    service
        .refresh(networking_catalog())
        .await
        .expect("refresh");

    let result = service
        .recommend_related_courses("redes", &[101, 102], &ContextHint::default())
        .await
        .expect("recommend");

    assert_eq!(result.mode_used, ScoringMode::Hybrid);
    assert_eq!(result.ids().first(), Some(&103));
    assert!(result.ids().iter().all(|id| *id != 101 && *id != 102));
}

#[tokio::test]
async fn scenario_d_empty_trends_yield_null_prediction() {
    let service = RankingService::new(AulaConfig::default(), None);
    service
        .refresh(networking_catalog())
        .await
        .expect("refresh");

    let result = service
        .predict_popular_course(&[])
        .await
        .expect("predict");

    assert!(result.predicted_name.is_none());
    assert!(result.predicted_id.is_none());
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.reason, INSUFFICIENT_DATA_REASON);
    assert_eq!(result.search_count, 0);
}

#[test]
fn scenario_d_empty_catalog_yields_null_prediction() {
    let trends = vec![AggregatedQuery::with_weight("redes", 10, 10.0)];
    let result = course_scorer()
        .predict(&Catalog::default(), &trends, None)
        .expect("predict");
    assert!(result.is_null());
    assert_eq!(result.reason, INSUFFICIENT_DATA_REASON);
}

#[tokio::test]
async fn scenario_e_diffuse_direct_results_return_nothing() {
    let service = RankingService::new(AulaConfig::default(), Some(mock_provider()));
    service
        .refresh(networking_catalog())
        .await
        .expect("refresh");

    let result = service
        .recommend_related_courses(
            "redes",
            &[101, 102, 103, 104, 105],
            &ContextHint::default(),
        )
        .await
        .expect("recommend");

    assert!(result.items.is_empty());
}
