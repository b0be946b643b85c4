use order_draft::{
    config::StoreConfig,
    meal_box::{DietaryPreference, MealBoxProgress, PortionCount},
    CartLineItem, OrderDraftStore, Price, ServiceCategory,
};
use tracing_subscriber::EnvFilter;

// Walks a shopper through a bulk-meal cart, a switch to the meal-box wizard
// and a "restart". Run with RUST_LOG=order_draft=debug to see each transition.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "order_draft=info".into()),
        )
        .init();

    let config = StoreConfig::from_env();

    {
        let mut store = OrderDraftStore::open(&config)?;

        if store.has_pending_progress(ServiceCategory::BulkMeals)
            || store.has_pending_progress(ServiceCategory::MealBox)
        {
            println!("resuming draft {:?}: {:#?}", store.draft_id(), store.snapshot());
            store.clear_cart();
            store.clear_meal_box_progress();
        }

        store.enter_category(ServiceCategory::BulkMeals);
        store.add_to_cart(
            ServiceCategory::BulkMeals,
            CartLineItem::new(101, "Veg Biryani Tray", Price::from_minor(54_00), 2),
        );
        store.add_to_cart(
            ServiceCategory::BulkMeals,
            CartLineItem::new(102, "Paneer Tikka Tray", Price::from_minor(61_50), 1),
        );
        println!(
            "bulk cart: {} items, subtotal {}",
            store.item_count(),
            store.subtotal()
        );

        store.enter_category(ServiceCategory::MealBox);
        let mut progress = MealBoxProgress::new(PortionCount::Five, DietaryPreference::Veg);
        progress.veg_boxes = "12".into();
        store.save_meal_box_progress(progress.at_step(2));
        println!(
            "after switch: cart lines {}, meal-box pending {}",
            store.cart().len(),
            store.has_pending_progress(ServiceCategory::MealBox)
        );

        store.flush()?;
    }

    let store = OrderDraftStore::open(&config)?;
    println!(
        "reopened: category {:?}, step {:?}, saved at {:?}",
        store.active_category(),
        store.meal_box_progress().map(|progress| progress.current_step),
        store.meal_box_saved_at()
    );

    Ok(())
}
