use image::{Rgba, RgbaImage};
use photocard_rust::fonts::resolve_card_font;
use photocard_rust::render::{run_batch, CardRenderer, RenderMode, RenderOptions};
use photocard_rust::settings::Settings;
use photocard_rust::{read_feed, ImageFetcher, Template};

fn template_image() -> RgbaImage {
    let mut base = RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255]));
    for y in 40..140 {
        for x in 20..180 {
            base.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    base
}

#[tokio::test]
async fn batch_renders_skips_and_fails_per_article() {
    let dir = tempfile::tempdir().unwrap();

    let photo_path = dir.path().join("photo.png");
    RgbaImage::from_pixel(320, 240, Rgba([10, 120, 200, 255]))
        .save(&photo_path)
        .unwrap();

    let feed_path = dir.path().join("feed.json");
    std::fs::write(
        &feed_path,
        serde_json::json!({
            "articles": [
                {
                    "article_image": photo_path.to_str().unwrap(),
                    "article_title": "River Erosion Displaces Families",
                    "published_date_bn": "১২ আগস্ট ২০২৫",
                    "source": "Prothom Alo",
                    "category_bn": "জাতীয়"
                },
                {
                    "article_image": "",
                    "article_title": "No picture here"
                },
                {
                    "article_image": dir.path().join("missing.jpg").to_str().unwrap(),
                    "article_title": "Broken reference"
                }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let settings = Settings::default();
    let template = Template::from_image(template_image(), &settings.template);
    let font = resolve_card_font(None, &settings.fonts.fallback_families);
    let renderer = CardRenderer::new(template, settings, font);
    let fetcher = ImageFetcher::new(None);

    let out_dir = dir.path().join("cards");
    let options = RenderOptions {
        mode: RenderMode::FullComposite,
        out_dir: out_dir.clone(),
        limit: 0,
        jobs: 2,
        with_text: true,
    };

    let articles = read_feed(&feed_path).unwrap();
    let summary = run_batch(&renderer, &fetcher, &articles, &options)
        .await
        .unwrap();

    assert_eq!(summary.rendered, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 1);

    let card_path = out_dir.join("River-Erosion-Displaces-Families.png");
    assert_eq!(summary.outputs, vec![card_path.clone()]);
    let card = image::open(&card_path).unwrap();
    assert_eq!((card.width(), card.height()), (200, 200));
}

#[tokio::test]
async fn text_overlay_mode_draws_on_matching_bases_and_fails_the_rest() {
    let dir = tempfile::tempdir().unwrap();

    let feed_path = dir.path().join("feed.json");
    std::fs::write(
        &feed_path,
        r#"[
            {"article_title": "Matching base"},
            {"article_title": "Wrong size"},
            {"article_title": "Missing base"}
        ]"#,
    )
    .unwrap();

    let base_dir = dir.path().join("bases");
    std::fs::create_dir_all(&base_dir).unwrap();
    RgbaImage::from_pixel(200, 200, Rgba([80, 80, 200, 255]))
        .save(base_dir.join("Matching-base.png"))
        .unwrap();
    RgbaImage::from_pixel(100, 50, Rgba([80, 200, 80, 255]))
        .save(base_dir.join("Wrong-size.png"))
        .unwrap();

    let settings = Settings::default();
    let template = Template::from_image(template_image(), &settings.template);
    let font = resolve_card_font(None, &settings.fonts.fallback_families);
    let renderer = CardRenderer::new(template, settings, font);
    let fetcher = ImageFetcher::new(None);

    let out_dir = dir.path().join("cards");
    let options = RenderOptions {
        mode: RenderMode::TextOverlayOnly { base_dir },
        out_dir: out_dir.clone(),
        limit: 0,
        jobs: 1,
        with_text: true,
    };

    let articles = read_feed(&feed_path).unwrap();
    let summary = run_batch(&renderer, &fetcher, &articles, &options)
        .await
        .unwrap();

    // The 100x50 base and the absent one both fail; nothing is skipped,
    // because this mode never consults article_image.
    assert_eq!(summary.rendered, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 2);

    let card_path = out_dir.join("Matching-base.png");
    assert_eq!(summary.outputs, vec![card_path.clone()]);
    let card = image::open(&card_path).unwrap();
    assert_eq!((card.width(), card.height()), (200, 200));
    assert!(!out_dir.join("Wrong-size.png").exists());
    assert!(!out_dir.join("Missing-base.png").exists());
}

#[tokio::test]
async fn limit_caps_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let feed_path = dir.path().join("feed.json");
    std::fs::write(
        &feed_path,
        r#"[{"article_title": "one"}, {"article_title": "two"}, {"article_title": "three"}]"#,
    )
    .unwrap();

    let settings = Settings::default();
    let template = Template::from_image(template_image(), &settings.template);
    let font = resolve_card_font(None, &settings.fonts.fallback_families);
    let renderer = CardRenderer::new(template, settings, font);
    let fetcher = ImageFetcher::new(None);

    let options = RenderOptions {
        mode: RenderMode::FullComposite,
        out_dir: dir.path().join("cards"),
        limit: 2,
        jobs: 1,
        with_text: true,
    };

    let articles = read_feed(&feed_path).unwrap();
    let summary = run_batch(&renderer, &fetcher, &articles, &options)
        .await
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.rendered + summary.failed, 0);
}
