use axum::response::{Html, Json};
use serde_json::{Value, json};

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// The business flow behind "Make a Claim!", for the design view.
pub async fn design() -> Json<Value> {
    Json(json!({
        "name": "ClaimGenius",
        "description": "AI assistant for insurance claims: policy Q&A, claim-form Q&A and invoice-based claim adjudication",
        "assistants": {
            "POST /policy/ask": "Claim Policy Assistant - questions over the policy document knowledge base",
            "POST /claim-forms/ask": "Claim Form Assistant - questions over the claim form knowledge base",
            "POST /claims": "Make a Claim! - upload an invoice PDF and get a claim decision"
        },
        "claim_flow": [
            { "state": "uploaded", "step": "Invoice PDF saved under the upload directory" },
            { "state": "extracted", "step": "Invoice total and treatment type read from the PDF" },
            { "state": "policy_looked_up", "step": "Policy knowledge base asked for the yearly cashback of the treatment" },
            { "state": "claim_details_built", "step": "Invoice total and treatment type joined into the claim details" },
            { "state": "decided", "step": "Claim decision stage approves, partially approves or rejects the claim" },
            { "state": "cashback_extracted", "step": "Cashback amount read from the decision" },
            { "state": "finalized", "step": "Customer-facing summary written from the invoice and the decision" }
        ],
        "failure": "Any failing step ends the run; nothing is retried and no final response is produced"
    }))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>ClaimGenius</title>
  <style>
    body { margin: 0; font-family: system-ui, sans-serif; display: flex; min-height: 100vh; color: #1f2937; }
    nav { width: 320px; background: #f3f4f6; padding: 24px; box-sizing: border-box; }
    nav h2 { font-size: 1rem; margin-top: 0; }
    nav label { display: block; padding: 8px 0; cursor: pointer; }
    main { flex: 1; padding: 32px; max-width: 900px; }
    section { display: none; }
    section.active { display: block; }
    textarea { width: 100%; height: 100px; font: inherit; }
    button { margin-top: 8px; background: #dc2626; color: white; border: 0; padding: 8px 16px; border-radius: 6px; cursor: pointer; }
    button:disabled { background: #9ca3af; }
    .example { color: #6b7280; margin: 2px 0; }
    .answer { color: #1d4ed8; white-space: pre-wrap; }
    .final { color: #b91c1c; white-space: pre-wrap; font-weight: 600; }
    .error { color: #b91c1c; background: #fef2f2; padding: 8px; border-radius: 6px; white-space: pre-wrap; }
    .success { color: #15803d; }
    pre { background: #f9fafb; padding: 8px; overflow-x: auto; }
  </style>
</head>
<body>
  <nav>
    <h2>What can I do for you today?</h2>
    <label><input type="radio" name="menu" value="policy" checked> Claim Policy Assistant</label>
    <label><input type="radio" name="menu" value="forms"> Claim Form Assistant</label>
    <label><input type="radio" name="menu" value="claim"> Make a Claim!</label>
    <label><input type="radio" name="menu" value="design"> ClaimGenius - Design</label>
  </nav>
  <main>
    <h1>ClaimGenius : Your AI Assistant for Insurance Claims</h1>

    <section id="policy" class="active">
      <h2>Claim Policy Assistant</h2>
      <p>Example questions you can ask:</p>
      <p class="example">What is the cashback amount for dental fees per year?</p>
      <p class="example">What is the cashback amount for optical fees per year?</p>
      <textarea id="policy-question" placeholder="How can I help you with the policy document knowledge base today?"></textarea>
      <button data-ask="policy" data-url="/policy/ask">submit</button>
      <div id="policy-result"></div>
    </section>

    <section id="forms">
      <h2>Claim Form Assistant</h2>
      <p>Example questions you can ask:</p>
      <p class="example">Who filed the insurance claim for the accident that happened on Sunset Blvd?</p>
      <p class="example">How did Ms. Patel's accident happen?</p>
      <textarea id="forms-question" placeholder="How can I help you with the claim form knowledge base today?"></textarea>
      <button data-ask="forms" data-url="/claim-forms/ask">submit</button>
      <div id="forms-result"></div>
    </section>

    <section id="claim">
      <h2>Make a Claim!</h2>
      <p>Please upload your invoice to get started</p>
      <input type="file" id="invoice" accept="application/pdf,.pdf">
      <button id="claim-submit">submit</button>
      <div id="claim-result"></div>
    </section>

    <section id="design">
      <h2>ClaimGenius - Business Flow</h2>
      <ol id="design-flow"></ol>
      <p>ClaimGenius is an AI assistant that helps you with your insurance claims.</p>
      <p>It can help you with your policy document knowledge base, help you with your claims, and more.</p>
      <p>Feel free to chat with your Policy Assistant or make a claim to get started!</p>
    </section>
  </main>
  <script>
    const el = (tag, cls, text) => {
      const node = document.createElement(tag);
      if (cls) node.className = cls;
      if (text !== undefined) node.textContent = text;
      return node;
    };

    const showError = (target, body) => {
      const lines = [body.error || 'Request failed'];
      if (body.failed_after) lines.push('Stopped after: ' + body.failed_after);
      target.appendChild(el('div', 'error', lines.join('\n')));
      if (body.partial) target.appendChild(el('pre', '', JSON.stringify(body.partial, null, 2)));
    };

    document.querySelectorAll('input[name=menu]').forEach((radio) => {
      radio.addEventListener('change', () => {
        document.querySelectorAll('section').forEach((s) => s.classList.toggle('active', s.id === radio.value));
      });
    });

    document.querySelectorAll('button[data-ask]').forEach((button) => {
      button.addEventListener('click', async () => {
        const key = button.dataset.ask;
        const question = document.getElementById(key + '-question').value;
        const target = document.getElementById(key + '-result');
        target.replaceChildren();
        if (!question.trim()) return;
        button.disabled = true;
        try {
          const response = await fetch(button.dataset.url, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify({ question }),
          });
          const body = await response.json();
          if (response.ok) {
            target.appendChild(el('p', 'answer', 'chat_result: ' + body.answer));
          } else {
            showError(target, body);
          }
        } catch (e) {
          showError(target, { error: String(e) });
        } finally {
          button.disabled = false;
        }
      });
    });

    document.getElementById('claim-submit').addEventListener('click', async (event) => {
      const button = event.target;
      const file = document.getElementById('invoice').files[0];
      const target = document.getElementById('claim-result');
      target.replaceChildren();
      if (!file) return;
      const form = new FormData();
      form.append('file', file);
      button.disabled = true;
      try {
        const response = await fetch('/claims', { method: 'POST', body: form });
        const body = await response.json();
        if (!response.ok) {
          showError(target, body);
          return;
        }
        const run = body.run;
        target.appendChild(el('p', 'success', body.message));
        target.appendChild(el('pre', '', JSON.stringify(run.invoice, null, 2)));
        target.appendChild(el('p', 'answer', 'policy_section: ' + run.policy_section));
        target.appendChild(el('p', 'answer', 'claim_details_extracted: ' + run.claim_details.text));
        target.appendChild(el('p', 'answer', run.claim_decision.decision + ': ' + run.claim_decision.reason));
        target.appendChild(el('p', '', 'cashback: ' + run.cashback.cashback_amount));
        target.appendChild(el('p', 'final', run.final_response.message));
      } catch (e) {
        showError(target, { error: String(e) });
      } finally {
        button.disabled = false;
      }
    });

    fetch('/design').then((r) => r.json()).then((design) => {
      const list = document.getElementById('design-flow');
      design.claim_flow.forEach((step) => list.appendChild(el('li', '', step.step)));
    });
  </script>
</body>
</html>
"#;
